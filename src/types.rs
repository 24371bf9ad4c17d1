//! Core types for grid-sync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of one image within an account's store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    /// Create a new MediaId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote collection being synchronized
///
/// Built once per run by [`GridSync::connect`](crate::GridSync::connect). The
/// token is resolved before any pool starts and stays fixed for the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Subdomain identifying the account on the remote site
    pub subdomain: String,
    /// Numeric owner id used as `site_id` in metadata requests
    pub owner_id: u64,
    /// Access token embedded in metadata URLs and sent as the `vs` cookie
    pub token: String,
    /// Location of the account's metadata store
    pub store_path: PathBuf,
    /// Directory holding the account's cached images
    pub image_dir: PathBuf,
}

/// One fully-formed metadata page request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageDescriptor {
    /// 1-based page number
    pub page: u64,
    /// Entries requested for this page
    pub size: u64,
    /// Complete request URL
    pub url: String,
}

/// Raw entries returned for one page, tagged with the page that produced them
#[derive(Clone, Debug, Default)]
pub struct PageBatch {
    /// Page number of the originating [`PageDescriptor`]
    pub page: u64,
    /// Raw entry documents in response order
    pub entries: Vec<serde_json::Value>,
    /// Failure description when the page produced no usable response
    pub error: Option<String>,
}

impl PageBatch {
    /// A batch standing in for a page whose fetch failed
    pub fn failed(page: u64, error: impl Into<String>) -> Self {
        Self {
            page,
            entries: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the originating fetch failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Counts produced by one image caching run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    /// Images downloaded and written during this run
    pub cached: usize,
    /// Images whose cache file already existed
    pub skipped: usize,
    /// Images that could not be downloaded or written
    pub failed: usize,
}

impl CacheReport {
    /// Number of jobs accounted for
    pub fn total(&self) -> usize {
        self.cached + self.skipped + self.failed
    }
}

/// Progress event emitted while synchronizing an account
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The probe request returned and pages were planned
    PagesPlanned {
        /// Total entries reported by the remote service
        total: u64,
        /// Number of pages that will be fetched
        pages: usize,
    },

    /// A metadata page was fetched and parsed
    PageFetched {
        /// Page number
        page: u64,
        /// Entries in the page
        entries: usize,
    },

    /// A metadata page fetch failed
    PageFailed {
        /// Page number
        page: u64,
        /// Error message
        error: String,
    },

    /// The metadata store was written to disk
    StoreFlushed {
        /// Entries in the store after the flush
        entries: usize,
    },

    /// All planned pages were merged
    MetadataComplete {
        /// Entries in the final store
        entries: usize,
        /// Pages that failed
        failed_pages: usize,
    },

    /// An image was downloaded into the cache
    ImageCached {
        /// Image identifier
        id: MediaId,
        /// Cache file path
        path: PathBuf,
    },

    /// An image was already present in the cache
    ImageSkipped {
        /// Image identifier
        id: MediaId,
    },

    /// An image download failed
    ImageFailed {
        /// Image identifier
        id: MediaId,
        /// Error message
        error: String,
    },

    /// All enqueued image jobs were acknowledged
    ImagesComplete {
        /// Final counts
        report: CacheReport,
    },
}
