//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use filer_core::Visibility;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A physical store holding file bytes under string keys.
///
/// Keys are `/`-separated relative paths. Stores know nothing about the
/// metadata index; they only move bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Native attributes of an object without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Put an object only if it doesn't exist. Returns `false` when the key
    /// was already taken and nothing was written.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Delete an object. A missing key is `StorageError::NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Verify the store can serve reads, without writing to it.
    ///
    /// Used for stores that only hold pre-existing objects. The default
    /// looks up a key that is not expected to exist.
    async fn read_health_check(&self) -> StorageResult<()> {
        self.exists(READ_PROBE_KEY).await.map(|_| ())
    }
}

/// Key looked up by the default read-only health check.
const READ_PROBE_KEY: &str = ".filer-read-probe";

/// Attributes a store reports natively for an object.
#[derive(Clone, Debug, Default)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
    /// Entity tag with surrounding quotes removed (if available).
    pub etag: Option<String>,
    /// Visibility (if the store has such a notion).
    pub visibility: Option<Visibility>,
}
