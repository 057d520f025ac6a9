//! In-process metadata repository.

use crate::catalog::Catalog;
use crate::error::{MetadataError, MetadataResult};
use crate::repository::{MetadataRepository, MetadataStream, error_stream, not_found};
use async_trait::async_trait;
use filer_core::{BackingData, Metadata, Visibility};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository holding every record in memory.
///
/// Each instance owns its catalog; only handles obtained through
/// [`MetadataRepository::scoped`] share it.
#[derive(Default)]
pub struct MemoryRepository {
    catalog: Arc<RwLock<Catalog>>,
    storage_id: Option<String>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataRepository for MemoryRepository {
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
            catalog: Arc::clone(&self.catalog),
            storage_id: Some(storage_id.to_string()),
        })
    }

    async fn get_metadata(&self, path: &str) -> MetadataResult<Option<Metadata>> {
        let storage_id = self.storage_id()?;
        Ok(self.catalog.read().await.get(storage_id, path).cloned())
    }

    async fn directory_exists(&self, prefix: &str) -> MetadataResult<bool> {
        let storage_id = self.storage_id()?;
        Ok(self.catalog.read().await.directory_exists(storage_id, prefix))
    }

    fn list_contents<'a>(&'a self, prefix: &str, recursive: bool) -> MetadataStream<'a> {
        let storage_id = match self.storage_id() {
            Ok(id) => id,
            Err(e) => return error_stream(e),
        };
        let prefix = prefix.to_string();
        Box::pin(async_stream::stream! {
            let records = self.catalog.read().await.list(storage_id, &prefix, recursive);
            for metadata in records {
                yield Ok::<_, MetadataError>(metadata);
            }
        })
    }

    async fn record(&self, metadata: &Metadata) -> MetadataResult<Metadata> {
        let storage_id = self.storage_id()?;
        Ok(self.catalog.write().await.record(storage_id, metadata))
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.catalog
            .write()
            .await
            .set_visibility(storage_id, path, visibility)
    }

    async fn set_backing_data(
        &self,
        path: &str,
        backing_data: &BackingData,
    ) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.catalog
            .write()
            .await
            .set_backing_data(storage_id, path, backing_data)
    }

    async fn delete(&self, path: &str) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        self.catalog.write().await.delete(storage_id, path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> MetadataResult<()> {
        let storage_id = self.storage_id()?;
        let mut catalog = self.catalog.write().await;
        if catalog.get(storage_id, from).is_none() {
            return Err(not_found(storage_id, from));
        }
        catalog.rename(storage_id, from, to)
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}
