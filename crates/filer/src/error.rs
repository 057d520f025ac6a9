//! Filer error types.

use filer_metadata::MetadataError;
use filer_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by volumes and their strategies.
#[derive(Debug, Error)]
pub enum FilerError {
    #[error("no store accepted {path} (tried: {})", tried.join(", "))]
    WriteFailed { path: String, tried: Vec<String> },

    #[error("no store could serve {path} (tried: {})", tried.join(", "))]
    ReadFailed { path: String, tried: Vec<String> },

    #[error("failed to delete {path} from store {backend}: {source}")]
    DeleteFailed {
        path: String,
        backend: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("store not found: {0}")]
    BackendNotFound(String),

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("store {store} is unhealthy: {source}")]
    Unhealthy {
        store: String,
        #[source]
        source: StorageError,
    },

    #[error("index error: {0}")]
    Index(#[from] MetadataError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FilerError {
    /// Whether this error means the logical path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FilerError::NotFound(_))
    }
}

/// Result type for filer operations.
pub type FilerResult<T> = std::result::Result<T, FilerError>;
