//! Metadata fetch pool and aggregator.
//!
//! Page descriptors flow through a bounded queue to a pool of fetch workers.
//! Each worker pushes a [`PageBatch`] onto a second queue drained by a single
//! aggregator task, which is the only writer of the [`MetadataStore`]: it
//! merges every batch and flushes the whole store after each one.

use crate::config::{FailurePolicy, MetadataConfig};
use crate::error::{Error, Result};
use crate::pool::{Consumer, Producer, drain, work_queue};
use crate::session::get_json;
use crate::store::MetadataStore;
use crate::types::{Event, PageBatch, PageDescriptor};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Outcome of a metadata run
#[derive(Debug)]
pub struct MetadataOutcome {
    /// Store after every batch has been merged and flushed
    pub store: MetadataStore,
    /// Pages planned
    pub pages: usize,
    /// Pages whose fetch failed and contributed no entries
    pub failed_pages: usize,
}

/// Fetch one page; failures come back as an empty batch carrying the error.
pub async fn fetch_page(client: &reqwest::Client, page: &PageDescriptor) -> PageBatch {
    let body = match get_json(client, &page.url).await {
        Ok(body) => body,
        Err(e) => return PageBatch::failed(page.page, e.to_string()),
    };

    match body.get("media") {
        Some(Value::Array(entries)) => PageBatch {
            page: page.page,
            entries: entries.clone(),
            error: None,
        },
        _ => PageBatch::failed(page.page, "response has no media array"),
    }
}

/// Fetch every page and merge the results into the store at `store_path`.
///
/// The existing store is loaded first, so previously persisted entries
/// survive unless a fetched entry with the same identifier replaces them.
/// Under [`FailurePolicy::Surface`] failed pages turn into
/// [`Error::PageFailures`] once every successful page has been persisted.
pub async fn download_metadata(
    client: &reqwest::Client,
    config: &MetadataConfig,
    policy: FailurePolicy,
    store: MetadataStore,
    pages: Vec<PageDescriptor>,
    event_tx: &broadcast::Sender<Event>,
) -> Result<MetadataOutcome> {
    let total_pages = pages.len();
    let pool_size = total_pages.min(config.max_workers).max(1);
    tracing::debug!(pages = total_pages, workers = pool_size, "starting metadata pool");

    let (page_tx, page_rx) = work_queue::<PageDescriptor>(config.queue_capacity);
    let (batch_tx, batch_rx) = work_queue::<PageBatch>(config.queue_capacity);

    let mut aggregator = JoinSet::new();
    aggregator.spawn(
        aggregate(store, batch_rx, event_tx.clone())
            .instrument(tracing::info_span!("metadata_aggregator")),
    );

    let mut fetchers = JoinSet::new();
    for worker in 0..pool_size {
        fetchers.spawn(
            fetch_worker(
                client.clone(),
                page_rx.clone(),
                batch_tx.clone(),
                event_tx.clone(),
            )
            .instrument(tracing::info_span!("metadata_worker", worker)),
        );
    }
    drop(page_rx);

    for page in pages {
        page_tx.put(page).await?;
    }

    // Fetchers hold the remaining batch producers; they exit once the page queue closes
    drain(page_tx, fetchers).await?;
    let aggregated = drain(batch_tx, aggregator)
        .await?
        .pop()
        .ok_or(Error::QueueClosed)??;

    let (store, failed_pages) = aggregated;
    event_tx
        .send(Event::MetadataComplete {
            entries: store.len(),
            failed_pages,
        })
        .ok();
    tracing::info!(
        entries = store.len(),
        pages = total_pages,
        failed_pages,
        "metadata download complete"
    );

    if policy == FailurePolicy::Surface && failed_pages > 0 {
        return Err(Error::PageFailures {
            failed: failed_pages,
            total: total_pages,
        });
    }

    Ok(MetadataOutcome {
        store,
        pages: total_pages,
        failed_pages,
    })
}

async fn fetch_worker(
    client: reqwest::Client,
    pages: Consumer<PageDescriptor>,
    batches: Producer<PageBatch>,
    event_tx: broadcast::Sender<Event>,
) {
    while let Some((page, _ack)) = pages.take().await {
        let batch = fetch_page(&client, &page).await;
        match &batch.error {
            Some(error) => {
                tracing::warn!(page = page.page, url = %page.url, error = %error, "Metadata page failed, treating as empty");
                event_tx
                    .send(Event::PageFailed {
                        page: page.page,
                        error: error.clone(),
                    })
                    .ok();
            }
            None => {
                tracing::debug!(page = page.page, entries = batch.entries.len(), "Fetched metadata page");
                event_tx
                    .send(Event::PageFetched {
                        page: page.page,
                        entries: batch.entries.len(),
                    })
                    .ok();
            }
        }

        // The page is acknowledged only after its batch is queued
        if batches.put(batch).await.is_err() {
            tracing::error!(page = page.page, "Batch queue closed, dropping page");
        }
    }
}

/// Single writer of the store: merge each batch and flush after it.
async fn aggregate(
    mut store: MetadataStore,
    batches: Consumer<PageBatch>,
    event_tx: broadcast::Sender<Event>,
) -> Result<(MetadataStore, usize)> {
    let mut failed_pages = 0;
    let mut flush_error = None;

    while let Some((batch, _ack)) = batches.take().await {
        if batch.is_failed() {
            failed_pages += 1;
        }
        let merged = store.merge_page(batch.entries);

        match store.persist().await {
            Ok(()) => {
                tracing::debug!(page = batch.page, merged, entries = store.len(), "Flushed metadata store");
                event_tx
                    .send(Event::StoreFlushed {
                        entries: store.len(),
                    })
                    .ok();
            }
            Err(e) => {
                tracing::error!(page = batch.page, path = %store.path().display(), error = %e, "Failed to flush metadata store");
                if flush_error.is_none() {
                    flush_error = Some(e);
                }
            }
        }
    }

    match flush_error {
        Some(e) => Err(e),
        None => Ok((store, failed_pages)),
    }
}
