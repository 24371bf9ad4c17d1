//! # grid-sync
//!
//! Concurrent fetch-and-cache pipeline for the photo metadata and image files
//! of an account on a photo-sharing grid.
//!
//! ## Pipelines
//!
//! - **Metadata**: a one-entry probe learns the total entry count, the
//!   [`planner`] turns it into page descriptors, a bounded pool of fetch
//!   workers retrieves the pages, and a single aggregator merges every page
//!   into the account's JSON store, flushing after each one.
//! - **Images**: every stored entry becomes an [`Image`] whose cache path is
//!   a pure function of subdomain, identifier and width; a fixed pool of
//!   workers downloads the ones not yet on disk.
//!
//! Both pools signal completion through a [`CompletionBarrier`](pool::CompletionBarrier):
//! the orchestrator blocks until every enqueued item has been acknowledged.
//!
//! ## Quick Start
//!
//! ```no_run
//! use grid_sync::{Config, GridSync, PageTokenResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let resolver = PageTokenResolver::from_config(&config.http);
//!     let sync = GridSync::connect(config, "slowed", None, &resolver).await?;
//!
//!     let mut events = sync.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let (metadata, images) = sync.sync_all().await?;
//!     println!("{} entries, {} images cached", metadata.store.len(), images.cached);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Flattened metadata entries and cacheable images
pub mod entity;
/// Error types
pub mod error;
/// Attribute histograms
pub mod histogram;
/// Image cache pool
pub mod images;
/// Metadata fetch pool and aggregator
pub mod metadata;
/// Pagination planning
pub mod planner;
/// Work queues and the completion barrier
pub mod pool;
/// HTTP session, token and owner resolution
pub mod session;
/// Persistent metadata store
pub mod store;
/// Account orchestrator
pub mod sync;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FailurePolicy};
pub use entity::{Image, MetadataEntry};
pub use error::{Error, Result};
pub use session::{PageTokenResolver, StaticToken, TokenResolver};
pub use store::MetadataStore;
pub use sync::GridSync;
pub use types::{Account, CacheReport, Event, MediaId, PageBatch, PageDescriptor};
