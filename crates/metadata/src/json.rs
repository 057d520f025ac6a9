//! Metadata repository persisted as a single JSON document.
//!
//! The whole catalog is held in memory and the document is rewritten on
//! every mutation: the change is applied to a copy, the copy is written to a
//! temp file which is fsynced and renamed over the document, and only then
//! does the copy replace the in-memory catalog. A failed write leaves both the
//! file and the in-memory state untouched.
//!
//! Writers in other processes are not coordinated; use one process per
//! document.

use crate::catalog::Catalog;
use crate::error::{MetadataError, MetadataResult};
use crate::repository::{MetadataRepository, MetadataStream, error_stream, not_found};
use async_trait::async_trait;
use filer_core::{BackingData, Metadata, Visibility};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

struct JsonDocument {
    path: PathBuf,
    catalog: RwLock<Catalog>,
}

impl JsonDocument {
    /// Apply `change` to a copy of the catalog, persist it, then publish it.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Catalog) -> MetadataResult<T>,
    ) -> MetadataResult<T> {
        let mut guard = self.catalog.write().await;
        let mut next = guard.clone();
        let output = change(&mut next)?;
        write_document(&self.path, &next).await?;
        *guard = next;
        Ok(output)
    }
}

async fn write_document(path: &Path, catalog: &Catalog) -> MetadataResult<()> {
    let body = serde_json::to_vec_pretty(catalog)?;
    let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));

    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(MetadataError::Io(e));
    }
    Ok(())
}

/// Repository backed by a JSON file.
pub struct JsonRepository {
    document: Arc<JsonDocument>,
    storage_id: Option<String>,
}

impl JsonRepository {
    /// Load the document at `path`, creating an empty one if it is absent.
    pub async fn open(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref().to_path_buf();

        let catalog = match fs::read(&path).await {
            Ok(body) => {
                let mut catalog: Catalog = serde_json::from_slice(&body)?;
                catalog.normalize();
                catalog
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent).await?;
                }
                let catalog = Catalog::default();
                write_document(&path, &catalog).await?;
                tracing::info!(path = %path.display(), "Created metadata document");
                catalog
            }
            Err(e) => return Err(MetadataError::Io(e)),
        };

        Ok(Self {
            document: Arc::new(JsonDocument {
                path,
                catalog: RwLock::new(catalog),
            }),
            storage_id: None,
        })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.document.path
    }
}

#[async_trait]
impl MetadataRepository for JsonRepository {
    fn set_storage_id(&mut self, storage_id: &str) {
        self.storage_id = Some(storage_id.to_string());
    }

    fn storage_id(&self) -> MetadataResult<&str> {
        self.storage_id
            .as_deref()
            .ok_or(MetadataError::NamespaceNotSelected)
    }

    fn scoped(&self, storage_id: &str) -> Box<dyn MetadataRepository> {
        Box::new(Self {
            document: Arc::clone(&self.document),
            storage_id: Some(storage_id.to_string()),
        })
    }

    async fn get_metadata(&self, path: &str) -> MetadataResult<Option<Metadata>> {
        let storage_id = self.storage_id()?;
        Ok(self
            .document
            .catalog
            .read()
            .await
            .get(storage_id, path)
            .cloned())
    }

    async fn directory_exists(&self, prefix: &str) -> MetadataResult<bool> {
        let storage_id = self.storage_id()?;
        Ok(self
            .document
            .catalog
            .read()
            .await
            .directory_exists(storage_id, prefix))
    }

    fn list_contents<'a>(&'a self, prefix: &str, recursive: bool) -> MetadataStream<'a> {
        let storage_id = match self.storage_id() {
            Ok(id) => id,
            Err(e) => return error_stream(e),
        };
        let prefix = prefix.to_string();
        Box::pin(async_stream::stream! {
            let records = self
                .document
                .catalog
                .read()
                .await
                .list(storage_id, &prefix, recursive);
            for metadata in records {
                yield Ok::<_, MetadataError>(metadata);
            }
        })
    }

    async fn record(&self, metadata: &Metadata) -> MetadataResult<Metadata> {
        let storage_id = self.storage_id()?;
        self.document
            .mutate(|catalog| Ok(catalog.record(storage_id, metadata)))
            .await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.document
            .mutate(|catalog| catalog.set_visibility(storage_id, path, visibility))
            .await
    }

    async fn set_backing_data(
        &self,
        path: &str,
        backing_data: &BackingData,
    ) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.document
            .mutate(|catalog| catalog.set_backing_data(storage_id, path, backing_data))
            .await
    }

    async fn delete(&self, path: &str) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        if self.get_metadata(path).await?.is_none() {
            return Ok(());
        }
        self.document
            .mutate(|catalog| {
                catalog.delete(storage_id, path);
                Ok(())
            })
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.document
            .mutate(|catalog| {
                if catalog.get(storage_id, from).is_none() {
                    return Err(not_found(storage_id, from));
                }
                catalog.rename(storage_id, from, to)
            })
            .await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        let meta = fs::metadata(&self.document.path).await?;
        if meta.permissions().readonly() {
            return Err(MetadataError::Config(format!(
                "metadata document is read-only: {}",
                self.document.path.display()
            )));
        }
        Ok(())
    }
}
