//! The metadata repository contract shared by every backend.

use crate::error::{MetadataError, MetadataResult};
use async_trait::async_trait;
use filer_core::{BackingData, Metadata, PATH_SEPARATOR, Visibility};
use futures::Stream;
use std::pin::Pin;

/// A stream of records produced by a listing, ordered by path.
pub type MetadataStream<'a> = Pin<Box<dyn Stream<Item = MetadataResult<Metadata>> + Send + 'a>>;

/// Persistent index of logical files, partitioned by storage id.
///
/// A repository must have a storage id selected before any data method is
/// called; otherwise every data method fails with
/// `MetadataError::NamespaceNotSelected`.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Select the namespace subsequent calls operate on.
    fn set_storage_id(&mut self, storage_id: &str);

    /// The selected namespace.
    fn storage_id(&self) -> MetadataResult<&str>;

    /// A handle onto the same underlying store with another namespace selected.
    fn scoped(&self, storage_id: &str) -> Box<dyn MetadataRepository>;

    /// The record for `path`, if indexed.
    async fn get_metadata(&self, path: &str) -> MetadataResult<Option<Metadata>>;

    async fn get_size(&self, path: &str) -> MetadataResult<Option<u64>> {
        Ok(self.get_metadata(path).await?.map(|m| m.size))
    }

    async fn get_mimetype(&self, path: &str) -> MetadataResult<Option<String>> {
        Ok(self.get_metadata(path).await?.map(|m| m.mimetype))
    }

    async fn get_visibility(&self, path: &str) -> MetadataResult<Option<Visibility>> {
        Ok(self.get_metadata(path).await?.map(|m| m.visibility))
    }

    async fn get_timestamp(&self, path: &str) -> MetadataResult<Option<i64>> {
        Ok(self.get_metadata(path).await?.map(|m| m.timestamp))
    }

    async fn file_exists(&self, path: &str) -> MetadataResult<bool> {
        Ok(self.get_metadata(path).await?.is_some())
    }

    /// True iff some indexed path lies under `prefix/` and `prefix` itself is
    /// not a file. The root always exists.
    async fn directory_exists(&self, prefix: &str) -> MetadataResult<bool>;

    /// Records under `prefix`, ascending by path. Without `recursive`, only
    /// direct children are returned.
    fn list_contents<'a>(&'a self, prefix: &str, recursive: bool) -> MetadataStream<'a>;

    /// Insert or replace the record at `metadata.path` and return what was
    /// stored.
    ///
    /// The stored id is the existing record's id for that path, else the
    /// supplied id (unless another record already uses it), else a new one.
    async fn record(&self, metadata: &Metadata) -> MetadataResult<Metadata>;

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> MetadataResult<()>;

    async fn set_backing_data(&self, path: &str, backing_data: &BackingData)
    -> MetadataResult<()>;

    /// Remove the record at `path`. Removing an absent record succeeds.
    async fn delete(&self, path: &str) -> MetadataResult<()>;

    /// Move the record at `from` to `to`, keeping its id and backing data.
    /// Any record already at `to` is replaced.
    async fn rename(&self, from: &str, to: &str) -> MetadataResult<()>;

    async fn health_check(&self) -> MetadataResult<()>;
}

/// Normalize a listing prefix to `""` or `"dir/"`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}{PATH_SEPARATOR}")
    }
}

/// Whether `path` belongs in a listing of the normalized `prefix`.
pub fn in_listing(path: &str, prefix: &str, recursive: bool) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() => recursive || !rest.contains(PATH_SEPARATOR),
        _ => false,
    }
}

/// A stream that yields a single error.
pub(crate) fn error_stream<'a>(err: MetadataError) -> MetadataStream<'a> {
    Box::pin(futures::stream::once(async move { Err(err) }))
}

/// `NotFound` for a path in a namespace.
pub(crate) fn not_found(storage_id: &str, path: &str) -> MetadataError {
    MetadataError::NotFound(format!("{storage_id}:{path}"))
}
