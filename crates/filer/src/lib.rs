//! Storage indirection layer.
//!
//! A [`Filer`] exposes named volumes. Each volume is a [`FilerAdapter`] that
//! maps logical paths onto one or more physical object stores and records
//! where every file lives in a metadata index. Volumes can sit in front of
//! *original* stores holding files written before the index existed; those
//! files are indexed on first access.
//!
//! ```no_run
//! # async fn run() -> filer::FilerResult<()> {
//! use filer_core::FilerConfig;
//!
//! let config = FilerConfig::load(Some(std::path::Path::new("filer.toml")))
//!     .map_err(|e| filer::FilerError::Config(e.to_string()))?;
//! let filer = filer::Filer::from_config(&config).await?;
//!
//! let uploads = filer.volume("uploads")?;
//! uploads.write("avatars/1.png", bytes::Bytes::from_static(b"...")).await?;
//! let size = uploads.get_size("avatars/1.png").await?;
//! # let _ = size;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod locks;
pub mod strategy;

pub use adapter::{FileAttributes, FilerAdapter};
pub use error::{FilerError, FilerResult};
pub use strategy::{AdapterStrategy, BasicStrategy, NamedStore};

use filer_core::{FilerConfig, VolumeConfig};
use filer_metadata::MetadataRepository;
use filer_storage::ObjectStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Registry of configured volumes sharing one set of stores and one index.
pub struct Filer {
    stores: BTreeMap<String, Arc<dyn ObjectStore>>,
    /// Stores some volume may write new files to.
    writable: BTreeSet<String>,
    repository: Box<dyn MetadataRepository>,
    volumes: HashMap<String, Arc<FilerAdapter>>,
}

impl Filer {
    /// Open every configured store and the metadata index, then build the
    /// volumes on top of them.
    pub async fn from_config(config: &FilerConfig) -> FilerResult<Self> {
        let mut stores = BTreeMap::new();
        for (name, store_config) in &config.stores {
            let store = filer_storage::from_config(store_config)
                .await
                .map_err(|e| FilerError::Config(format!("store '{name}': {e}")))?;
            tracing::info!(store = %name, backend = store.backend_name(), "Opened store");
            stores.insert(name.clone(), store);
        }

        let repository = filer_metadata::from_config(&config.metadata).await?;
        Self::from_parts(stores, repository, &config.volumes)
    }

    /// Build volumes over already-constructed stores and index.
    pub fn from_parts(
        stores: BTreeMap<String, Arc<dyn ObjectStore>>,
        repository: Box<dyn MetadataRepository>,
        volumes: &[VolumeConfig],
    ) -> FilerResult<Self> {
        let mut adapters = HashMap::new();
        let mut writable = BTreeSet::new();

        for volume in volumes {
            if volume.id.is_empty() {
                return Err(FilerError::Config("volume id must not be empty".to_string()));
            }
            if adapters.contains_key(&volume.id) {
                return Err(FilerError::Config(format!(
                    "duplicate volume id '{}'",
                    volume.id
                )));
            }
            if volume.backing.is_empty() {
                return Err(FilerError::Config(format!(
                    "volume '{}' has no backing stores",
                    volume.id
                )));
            }

            let backing = resolve_stores(&stores, &volume.backing)?;
            let original = resolve_stores(&stores, &volume.original)?;
            writable.extend(volume.backing.iter().cloned());
            if volume.options.allow_new_files_on_original_stores {
                writable.extend(volume.original.iter().cloned());
            }
            let strategy = BasicStrategy::new(backing, original, volume.options.clone());

            let adapter = FilerAdapter::new(
                volume.id.clone(),
                repository.scoped(&volume.id),
                Arc::new(strategy),
            );
            tracing::info!(
                volume = %volume.id,
                backing = ?volume.backing,
                original = ?volume.original,
                "Configured volume"
            );
            adapters.insert(volume.id.clone(), Arc::new(adapter));
        }

        Ok(Self {
            stores,
            writable,
            repository,
            volumes: adapters,
        })
    }

    pub fn volume(&self, id: &str) -> FilerResult<Arc<FilerAdapter>> {
        self.volumes
            .get(id)
            .cloned()
            .ok_or_else(|| FilerError::VolumeNotFound(id.to_string()))
    }

    /// Configured volume ids, sorted.
    pub fn volume_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.volumes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Check the index and every store. Fails on the first unhealthy one.
    ///
    /// Stores that only ever serve original files get a read-only check;
    /// nothing is written to them.
    pub async fn health_check(&self) -> FilerResult<()> {
        self.repository.health_check().await?;
        for (name, store) in &self.stores {
            let checked = if self.writable.contains(name) {
                store.health_check().await
            } else {
                store.read_health_check().await
            };
            checked.map_err(|source| FilerError::Unhealthy {
                store: name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn resolve_stores(
    stores: &BTreeMap<String, Arc<dyn ObjectStore>>,
    names: &[String],
) -> FilerResult<Vec<NamedStore>> {
    names
        .iter()
        .map(|name| {
            stores
                .get(name)
                .map(|store| (name.clone(), Arc::clone(store)))
                .ok_or_else(|| FilerError::BackendNotFound(name.clone()))
        })
        .collect()
}
