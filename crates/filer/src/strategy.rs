//! Placement and lookup policy across physical stores.
//!
//! A strategy owns two ordered lists of named stores:
//! - *backing* stores receive new files, first acceptance wins
//! - *original* stores hold legacy files that predate the index; they are
//!   only read from, unless a volume allows new files on them
//!
//! New bytes are stored under keys from [`new_object_key`], never under the
//! logical path. Reads and deletes only ever touch stores named in a file's
//! [`BackingData`], in priority order (backing stores first), at the key
//! recorded there.

use crate::error::{FilerError, FilerResult};
use async_trait::async_trait;
use bytes::Bytes;
use filer_core::{BackingData, StrategyOptions, new_object_key};
use filer_storage::{ByteStream, ObjectMeta, ObjectStore};
use std::sync::Arc;
use tracing::instrument;

/// A store together with the name it is configured under.
pub type NamedStore = (String, Arc<dyn ObjectStore>);

/// Decides which physical stores receive, serve and drop file bytes.
#[async_trait]
pub trait AdapterStrategy: Send + Sync {
    /// Place `content` under a fresh physical key on the first write target
    /// that accepts it. `path` is the logical path the bytes belong to.
    async fn write(&self, path: &str, content: Bytes) -> FilerResult<BackingData>;

    /// Read the bytes of `path` from the first recorded store that serves them.
    async fn read(&self, path: &str, backing_data: &BackingData) -> FilerResult<Bytes>;

    /// Open a stream over the bytes of `path` from the first recorded store
    /// that serves them.
    async fn read_stream(&self, path: &str, backing_data: &BackingData)
    -> FilerResult<ByteStream>;

    /// Remove the bytes of `path` from every recorded store.
    async fn delete(&self, path: &str, backing_data: &BackingData) -> FilerResult<()>;

    /// Duplicate the bytes of `source` under `destination`. Not atomic.
    async fn copy(
        &self,
        source: &str,
        source_backing_data: &BackingData,
        destination: &str,
    ) -> FilerResult<BackingData>;

    /// Whether any original store holds `path`.
    async fn has(&self, path: &str) -> bool;

    /// Native attributes of `path` from every original store that has it.
    async fn original_metadata(&self, path: &str) -> Vec<(String, ObjectMeta)>;

    /// Look up a configured store by name.
    fn store(&self, id: &str) -> FilerResult<Arc<dyn ObjectStore>>;

    fn has_original_stores(&self) -> bool;
}

/// Priority-ordered fallback over backing stores, then original stores.
pub struct BasicStrategy {
    backing: Vec<NamedStore>,
    original: Vec<NamedStore>,
    options: StrategyOptions,
}

impl BasicStrategy {
    pub fn new(backing: Vec<NamedStore>, original: Vec<NamedStore>, options: StrategyOptions) -> Self {
        Self {
            backing,
            original,
            options,
        }
    }

    /// Backing stores then original stores, each name once.
    fn combined(&self) -> Vec<&NamedStore> {
        let mut stores: Vec<&NamedStore> = Vec::new();
        for named in self.backing.iter().chain(self.original.iter()) {
            if !stores.iter().any(|(id, _)| *id == named.0) {
                stores.push(named);
            }
        }
        stores
    }

    fn write_targets(&self) -> impl Iterator<Item = &NamedStore> {
        let originals: &[NamedStore] = if self.options.allow_new_files_on_original_stores {
            self.original.as_slice()
        } else {
            &[]
        };
        self.backing.iter().chain(originals.iter())
    }

    /// Stores recorded in `backing_data`, in priority order, with the
    /// physical key each one holds the file under.
    fn candidates<'a>(
        &'a self,
        backing_data: &'a BackingData,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn ObjectStore>, &'a str)> {
        self.combined().into_iter().filter_map(move |(id, store)| {
            backing_data
                .get_disk(id)
                .map(|location| (id.as_str(), store, location.path.as_str()))
        })
    }
}

#[async_trait]
impl AdapterStrategy for BasicStrategy {
    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn write(&self, path: &str, content: Bytes) -> FilerResult<BackingData> {
        let key = new_object_key();
        let mut tried = Vec::new();

        for (id, store) in self.write_targets() {
            tried.push(id.clone());
            match store.put_if_not_exists(&key, content.clone()).await {
                Ok(true) => {
                    tracing::debug!(backend = %id, path = %path, key = %key, "Stored file");
                    return Ok(BackingData::disk_and_path(id.clone(), key));
                }
                Ok(false) => {
                    tracing::warn!(backend = %id, path = %path, key = %key, "Store already holds key, trying next");
                }
                Err(e) => {
                    tracing::warn!(backend = %id, path = %path, error = %e, "Store rejected write, trying next");
                }
            }
        }

        Err(FilerError::WriteFailed {
            path: path.to_string(),
            tried,
        })
    }

    #[instrument(skip(self, backing_data))]
    async fn read(&self, path: &str, backing_data: &BackingData) -> FilerResult<Bytes> {
        let mut tried = Vec::new();

        for (id, store, key) in self.candidates(backing_data) {
            tried.push(id.to_string());
            match store.get(key).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::warn!(backend = %id, path = %path, error = %e, "Read failed, trying next store");
                }
            }
        }

        Err(FilerError::ReadFailed {
            path: path.to_string(),
            tried,
        })
    }

    #[instrument(skip(self, backing_data))]
    async fn read_stream(
        &self,
        path: &str,
        backing_data: &BackingData,
    ) -> FilerResult<ByteStream> {
        let mut tried = Vec::new();

        for (id, store, key) in self.candidates(backing_data) {
            tried.push(id.to_string());
            match store.get_stream(key).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::warn!(backend = %id, path = %path, error = %e, "Stream open failed, trying next store");
                }
            }
        }

        Err(FilerError::ReadFailed {
            path: path.to_string(),
            tried,
        })
    }

    #[instrument(skip(self, backing_data))]
    async fn delete(&self, path: &str, backing_data: &BackingData) -> FilerResult<()> {
        let mut deleted = 0usize;

        for (id, store, key) in self.candidates(backing_data) {
            match store.delete(key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(backend = %id, path = %path, "Object already absent");
                }
                Err(e) => {
                    return Err(FilerError::DeleteFailed {
                        path: path.to_string(),
                        backend: id.to_string(),
                        source: Box::new(e),
                    });
                }
            }
            deleted += 1;
        }

        if deleted == 0 {
            tracing::warn!(path = %path, "No configured store is recorded for file, nothing to delete");
        }
        Ok(())
    }

    async fn copy(
        &self,
        source: &str,
        source_backing_data: &BackingData,
        destination: &str,
    ) -> FilerResult<BackingData> {
        let content = self.read(source, source_backing_data).await?;
        self.write(destination, content).await
    }

    async fn has(&self, path: &str) -> bool {
        for (id, store) in &self.original {
            match store.exists(path).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(backend = %id, path = %path, error = %e, "Original store probe failed");
                }
            }
        }
        false
    }

    async fn original_metadata(&self, path: &str) -> Vec<(String, ObjectMeta)> {
        let mut found = Vec::new();
        for (id, store) in &self.original {
            match store.head(path).await {
                Ok(meta) => found.push((id.clone(), meta)),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::debug!(backend = %id, path = %path, error = %e, "Original store probe failed");
                }
            }
        }
        found
    }

    fn store(&self, id: &str) -> FilerResult<Arc<dyn ObjectStore>> {
        self.combined()
            .into_iter()
            .find(|(name, _)| name == id)
            .map(|(_, store)| Arc::clone(store))
            .ok_or_else(|| FilerError::BackendNotFound(id.to_string()))
    }

    fn has_original_stores(&self) -> bool {
        !self.original.is_empty()
    }
}
