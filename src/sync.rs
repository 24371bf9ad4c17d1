//! [`GridSync`]: the per-account orchestrator.
//!
//! Owns the account, its HTTP session and the event channel, and runs the
//! two pipelines: planner → fetch pool → aggregator for metadata, and store
//! enumeration → image cache pool for images. Each component logs inside a
//! span derived from the account's span, so every line carries the subdomain.

use crate::config::Config;
use crate::entity::Image;
use crate::error::{Error, Result};
use crate::histogram;
use crate::images;
use crate::metadata::{self, MetadataOutcome};
use crate::planner::{self, PagePlan};
use crate::session::{self, TokenResolver};
use crate::store::MetadataStore;
use crate::types::{Account, CacheReport, Event};
use crate::utils::ensure_dir;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Instrument;

/// Capacity of the progress event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Synchronizes one account's metadata store and image cache
#[derive(Clone, Debug)]
pub struct GridSync {
    config: Arc<Config>,
    account: Account,
    client: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
    span: tracing::Span,
}

impl GridSync {
    /// Resolve the account and build its session.
    ///
    /// Creates the account's image directory, resolves the access token with
    /// `resolver` and the owner id (unless `owner_id` is given). All of this
    /// happens before any pool starts; failures here abort the run.
    pub async fn connect(
        config: Config,
        subdomain: &str,
        owner_id: Option<u64>,
        resolver: &dyn TokenResolver,
    ) -> Result<Self> {
        config.validate()?;
        if subdomain.is_empty() {
            return Err(Error::config("subdomain", "subdomain must not be empty"));
        }
        let span = tracing::info_span!("grid", subdomain);

        let image_dir = config.image_dir_for(subdomain);
        ensure_dir(&image_dir).await?;

        let (token, owner_id) = async {
            let bootstrap = session::build_client(&config.http, None)?;
            let token = resolver.resolve(&bootstrap).await?;
            tracing::debug!("access token grabbed");
            let owner_id =
                session::resolve_owner_id(&bootstrap, &config.http, subdomain, owner_id).await?;
            Ok::<_, Error>((token, owner_id))
        }
        .instrument(span.clone())
        .await?;

        let client = session::build_client(&config.http, Some(&token))?;
        let account = Account {
            subdomain: subdomain.to_string(),
            owner_id,
            token,
            store_path: config.store_path(subdomain),
            image_dir,
        };
        span.in_scope(|| tracing::info!(owner_id, "connected"));

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            account,
            client,
            event_tx,
            span,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The resolved account
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticated HTTP client shared by every worker
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Probe the account and plan the metadata pages.
    pub async fn plan_pages(&self) -> Result<PagePlan> {
        let plan = planner::plan_pages(
            &self.client,
            &self.config.http.api_base,
            &self.account,
            self.config.metadata.page_size,
            self.config.metadata.page_limit,
        )
        .instrument(self.span.clone())
        .await?;

        self.event_tx
            .send(Event::PagesPlanned {
                total: plan.total,
                pages: plan.pages.len(),
            })
            .ok();
        Ok(plan)
    }

    /// Fetch every planned page and merge it into the persisted store.
    pub async fn download_metadata(&self) -> Result<MetadataOutcome> {
        let plan = self.plan_pages().await?;
        let store = MetadataStore::load(&self.account.store_path).await;

        metadata::download_metadata(
            &self.client,
            &self.config.metadata,
            self.config.failure_policy,
            store,
            plan.pages,
            &self.event_tx,
        )
        .instrument(self.span.clone())
        .await
    }

    /// The persisted store; empty when nothing has been downloaded yet
    pub async fn load_store(&self) -> MetadataStore {
        MetadataStore::load(&self.account.store_path).await
    }

    /// One [`Image`] per stored entry at `width` (entry width when `None`).
    ///
    /// Entries that cannot form an image (no identifier, URL or width, or an
    /// identifier unusable as a file name) are skipped with a warning. Each
    /// distinct cache directory is created once.
    pub async fn images(&self, width: Option<u32>) -> Result<Vec<Arc<Image>>> {
        let store = self.load_store().await;
        let mut images = Vec::with_capacity(store.len());
        let mut cache_dirs = BTreeSet::new();
        for entry in store.entries() {
            match Image::new(
                entry,
                &self.config.paths.image_dir,
                &self.account.subdomain,
                &self.config.http.image_scheme,
                width,
            ) {
                Ok(image) => {
                    cache_dirs.insert(image.cache_dir().to_path_buf());
                    images.push(Arc::new(image));
                }
                Err(e) => {
                    self.span
                        .in_scope(|| tracing::warn!(error = %e, "Skipping entry that cannot be cached"));
                }
            }
        }
        for dir in &cache_dirs {
            ensure_dir(dir).await?;
        }
        Ok(images)
    }

    /// Cache every stored image at the configured cache width.
    pub async fn cache_all_images(&self) -> Result<CacheReport> {
        let jobs = self.images(Some(self.config.images.cache_width)).await?;
        images::cache_images(
            &self.client,
            &self.config.images,
            self.config.failure_policy,
            jobs,
            &self.event_tx,
        )
        .instrument(self.span.clone())
        .await
    }

    /// Download metadata, then cache every image it references.
    pub async fn sync_all(&self) -> Result<(MetadataOutcome, CacheReport)> {
        let outcome = self.download_metadata().await?;
        let report = self.cache_all_images().await?;
        Ok((outcome, report))
    }

    /// Identifier → value of one attribute for every stored entry that has it
    pub async fn attribute_values(&self, attribute: &str) -> BTreeMap<String, Value> {
        self.load_store().await.attribute_values(attribute)
    }

    /// Histogram of one attribute over the stored entries
    pub async fn attribute_frequency(
        &self,
        attribute: &str,
        proportional: bool,
        ascending: bool,
    ) -> Vec<(String, f64)> {
        histogram::attribute_frequency(&self.load_store().await, attribute, proportional, ascending)
    }
}
