//! Error types for grid-sync
//!
//! Errors fall into three groups:
//! - Fatal setup errors (token or owner resolution, a probe page without a
//!   `total`, directory creation) which abort a run before the store is touched
//! - Worker-level failures (non-2xx responses, transport errors) which are
//!   swallowed or collected depending on [`FailurePolicy`](crate::config::FailurePolicy)
//! - Pool bookkeeping errors (closed queues, panicked workers)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for grid-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for grid-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "metadata.page_size")
        key: Option<String>,
    },

    /// The access token could not be resolved
    #[error("token resolution failed: {0}")]
    TokenResolution(String),

    /// The numeric owner id of the account could not be resolved
    #[error("owner id resolution failed: {0}")]
    OwnerResolution(String),

    /// A response was missing a field the pipeline depends on
    #[error("response from {url} is missing field '{field}'")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// URL that produced the response
        url: String,
    },

    /// A remote value cannot be used as a file name component
    #[error("{field} '{value}' is not a safe file name component")]
    UnsafePathComponent {
        /// Field the value came from
        field: String,
        /// Offending value
        value: String,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a directory the pipeline writes into
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A cached image could not be decoded
    #[error("failed to decode {path}: {reason}")]
    Decode {
        /// Cached file that failed to decode
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// A work queue was closed while items were still being submitted
    #[error("work queue closed")]
    QueueClosed,

    /// A pool worker panicked
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Metadata pages failed under the surfacing failure policy
    #[error("{failed} of {total} metadata pages failed")]
    PageFailures {
        /// Number of pages that failed
        failed: usize,
        /// Number of pages planned
        total: usize,
    },

    /// Image downloads failed under the surfacing failure policy
    #[error("{failed} of {total} image downloads failed")]
    ImageFailures {
        /// Number of images that failed
        failed: usize,
        /// Number of images enqueued
        total: usize,
    },
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
