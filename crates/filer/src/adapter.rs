//! Logical file operations for one volume.
//!
//! A [`FilerAdapter`] answers every attribute and listing question from the
//! metadata index and only touches physical stores to move bytes. Files that
//! exist on an original store but not yet in the index are migrated lazily:
//! the first lookup that misses the index probes the original stores and
//! records what it finds.

use crate::error::{FilerError, FilerResult};
use crate::locks::PathLocks;
use crate::strategy::AdapterStrategy;
use bytes::Bytes;
use filer_core::{BackingData, DiskLocation, Metadata, Visibility, hash, mime, now_epoch};
use filer_metadata::{MetadataError, MetadataRepository};
use filer_storage::{ByteStream, ObjectMeta};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::instrument;

/// Attributes of a logical file as recorded in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: u64,
    pub mimetype: String,
    pub visibility: Visibility,
    /// Epoch seconds.
    pub last_modified: i64,
}

impl From<&Metadata> for FileAttributes {
    fn from(metadata: &Metadata) -> Self {
        Self {
            size: metadata.size,
            mimetype: metadata.mimetype.clone(),
            visibility: metadata.visibility,
            last_modified: metadata.timestamp,
        }
    }
}

pub struct FilerAdapter {
    storage_id: String,
    repository: Box<dyn MetadataRepository>,
    strategy: Arc<dyn AdapterStrategy>,
    locks: PathLocks,
}

impl FilerAdapter {
    /// Create an adapter for `storage_id`. The repository is switched to that
    /// namespace.
    pub fn new(
        storage_id: impl Into<String>,
        mut repository: Box<dyn MetadataRepository>,
        strategy: Arc<dyn AdapterStrategy>,
    ) -> Self {
        let storage_id = storage_id.into();
        repository.set_storage_id(&storage_id);
        Self {
            storage_id,
            repository,
            strategy,
            locks: PathLocks::new(),
        }
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    pub fn strategy(&self) -> &Arc<dyn AdapterStrategy> {
        &self.strategy
    }

    pub fn repository(&self) -> &dyn MetadataRepository {
        self.repository.as_ref()
    }

    /// Store `content` at `path`, replacing any previous content.
    ///
    /// New bytes are placed and indexed before the old ones are removed, so a
    /// failed replacement leaves the previous file intact. Old bytes that
    /// cannot be removed are left behind with a warning.
    #[instrument(skip(self, content), fields(storage_id = %self.storage_id, size = content.len()))]
    pub async fn write(&self, path: &str, content: Bytes) -> FilerResult<Metadata> {
        let _guard = self.locks.lock(path).await;

        let previous = self.repository.get_metadata(path).await?;
        let backing_data = self.strategy.write(path, content.clone()).await?;

        let metadata = match &previous {
            Some(previous) => {
                let mut replaced = previous.clone();
                replaced.update_contents(&content);
                replaced.with_backing_data(backing_data)
            }
            None => Metadata::generate(path, &content).with_backing_data(backing_data),
        };
        let stored = self.repository.record(&metadata).await?;
        tracing::debug!(storage_id = %self.storage_id, path = %path, "Recorded file");

        if let Some(previous) = previous
            && let Err(e) = self.strategy.delete(path, &previous.backing_data).await
        {
            tracing::warn!(
                storage_id = %self.storage_id,
                path = %path,
                error = %e,
                "Replaced file but could not remove its previous bytes"
            );
        }
        Ok(stored)
    }

    pub async fn read(&self, path: &str) -> FilerResult<Bytes> {
        let metadata = self.path_metadata(path).await?;
        self.strategy.read(path, &metadata.backing_data).await
    }

    pub async fn read_stream(&self, path: &str) -> FilerResult<ByteStream> {
        let metadata = self.path_metadata(path).await?;
        self.strategy.read_stream(path, &metadata.backing_data).await
    }

    /// Resolve the index record for `path`, migrating it from an original
    /// store on first sight.
    pub async fn path_metadata(&self, path: &str) -> FilerResult<Metadata> {
        if let Some(metadata) = self.repository.get_metadata(path).await? {
            return Ok(metadata);
        }
        if !self.strategy.has_original_stores() {
            return Err(FilerError::NotFound(path.to_string()));
        }

        let _guard = self.locks.lock(path).await;
        self.resolve_locked(path).await
    }

    /// `path_metadata` for callers already holding the lock on `path`.
    async fn resolve_locked(&self, path: &str) -> FilerResult<Metadata> {
        if let Some(metadata) = self.repository.get_metadata(path).await? {
            return Ok(metadata);
        }
        if !self.strategy.has_original_stores() {
            return Err(FilerError::NotFound(path.to_string()));
        }

        let found = self.strategy.original_metadata(path).await;
        let Some(metadata) = migrated_metadata(path, &found) else {
            return Err(FilerError::NotFound(path.to_string()));
        };

        let stored = self.repository.record(&metadata).await?;
        tracing::info!(
            storage_id = %self.storage_id,
            path = %path,
            backends = found.len(),
            "Migrated file from original store"
        );
        Ok(stored)
    }

    /// Remove the bytes of `path` from every store holding them, then its
    /// index entry. A physical failure leaves the entry in place.
    #[instrument(skip(self), fields(storage_id = %self.storage_id))]
    pub async fn delete(&self, path: &str) -> FilerResult<()> {
        let _guard = self.locks.lock(path).await;

        let metadata = self.resolve_locked(path).await?;
        self.strategy.delete(path, &metadata.backing_data).await?;
        self.repository.delete(path).await?;
        Ok(())
    }

    /// Duplicate `source` at `destination`. An existing file at the
    /// destination is removed first.
    #[instrument(skip(self), fields(storage_id = %self.storage_id))]
    pub async fn copy(&self, source: &str, destination: &str) -> FilerResult<Metadata> {
        let _guard = self.locks.lock_all(&[source, destination]).await;

        let metadata = self.resolve_locked(source).await?;
        if source == destination {
            return Ok(metadata);
        }
        self.remove_indexed(destination).await?;

        let backing_data = self
            .strategy
            .copy(source, &metadata.backing_data, destination)
            .await?;
        let copied = metadata.copied_to(destination, backing_data);
        Ok(self.repository.record(&copied).await?)
    }

    /// Move `source` to `destination` in the index. Bytes stay where they are.
    #[instrument(skip(self), fields(storage_id = %self.storage_id))]
    pub async fn rename(&self, source: &str, destination: &str) -> FilerResult<()> {
        let _guard = self.locks.lock_all(&[source, destination]).await;

        self.resolve_locked(source).await?;
        if source == destination {
            return Ok(());
        }
        self.remove_indexed(destination).await?;

        self.repository
            .rename(source, destination)
            .await
            .map_err(|e| index_error(source, e))
    }

    pub async fn move_file(&self, source: &str, destination: &str) -> FilerResult<()> {
        self.rename(source, destination).await
    }

    /// Delete bytes and index entry at `path` if it is indexed.
    async fn remove_indexed(&self, path: &str) -> FilerResult<()> {
        if let Some(existing) = self.repository.get_metadata(path).await? {
            self.strategy.delete(path, &existing.backing_data).await?;
            self.repository.delete(path).await?;
        }
        Ok(())
    }

    pub async fn set_visibility(&self, path: &str, visibility: Visibility) -> FilerResult<()> {
        self.repository
            .set_visibility(path, visibility)
            .await
            .map_err(|e| index_error(path, e))
    }

    /// Indexed files under `prefix`, ordered by path.
    pub async fn list_contents(&self, prefix: &str, recursive: bool) -> FilerResult<Vec<Metadata>> {
        Ok(self
            .repository
            .list_contents(prefix, recursive)
            .try_collect::<Vec<_>>()
            .await?)
    }

    pub async fn directory_exists(&self, path: &str) -> FilerResult<bool> {
        Ok(self.repository.directory_exists(path).await?)
    }

    pub async fn get_size(&self, path: &str) -> FilerResult<u64> {
        self.repository
            .get_size(path)
            .await?
            .ok_or_else(|| FilerError::NotFound(path.to_string()))
    }

    pub async fn get_mimetype(&self, path: &str) -> FilerResult<String> {
        self.repository
            .get_mimetype(path)
            .await?
            .ok_or_else(|| FilerError::NotFound(path.to_string()))
    }

    pub async fn get_visibility(&self, path: &str) -> FilerResult<Visibility> {
        self.repository
            .get_visibility(path)
            .await?
            .ok_or_else(|| FilerError::NotFound(path.to_string()))
    }

    /// Last modification time of `path` in epoch seconds.
    pub async fn get_last_modified(&self, path: &str) -> FilerResult<i64> {
        self.repository
            .get_timestamp(path)
            .await?
            .ok_or_else(|| FilerError::NotFound(path.to_string()))
    }

    pub async fn attributes(&self, path: &str) -> FilerResult<FileAttributes> {
        self.repository
            .get_metadata(path)
            .await?
            .map(|metadata| FileAttributes::from(&metadata))
            .ok_or_else(|| FilerError::NotFound(path.to_string()))
    }

    /// Whether `path` is indexed or present on an original store. Never
    /// migrates.
    pub async fn exists(&self, path: &str) -> FilerResult<bool> {
        if self.repository.file_exists(path).await? {
            return Ok(true);
        }
        if self.strategy.has_original_stores() {
            return Ok(self.strategy.has(path).await);
        }
        Ok(false)
    }
}

fn index_error(path: &str, error: MetadataError) -> FilerError {
    match error {
        MetadataError::NotFound(_) => FilerError::NotFound(path.to_string()),
        other => FilerError::Index(other),
    }
}

/// Index record for a file found on original stores. Attributes come from
/// the first store that reported it; every responder is recorded as holding
/// it under its logical path.
fn migrated_metadata(path: &str, found: &[(String, ObjectMeta)]) -> Option<Metadata> {
    let (_, first) = found.first()?;

    let backing_data: BackingData = found
        .iter()
        .map(|(id, _)| (id.clone(), DiskLocation::new(path)))
        .collect();
    let timestamp = first
        .last_modified
        .map(|t| t.unix_timestamp())
        .unwrap_or_else(now_epoch);

    let mut metadata = Metadata::new(path)
        .with_timestamp(timestamp)
        .with_visibility(first.visibility.unwrap_or_default())
        .with_backing_data(backing_data);
    metadata.size = first.size;
    metadata.mimetype = first
        .content_type
        .clone()
        .filter(|content_type| !content_type.is_empty())
        .or_else(|| mime::from_path(path))
        .unwrap_or_else(|| mime::DEFAULT_MIMETYPE.to_string());
    metadata.etag = first.etag.as_deref().map(hash::normalize_etag);
    Some(metadata)
}
