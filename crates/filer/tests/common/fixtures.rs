//! Volume fixtures.

use filer::{BasicStrategy, FilerAdapter, NamedStore};
use filer_core::StrategyOptions;
use filer_metadata::{MemoryRepository, MetadataRepository};
use filer_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Volume id used by the fixtures.
#[allow(dead_code)]
pub const VOLUME: &str = "uploads";

/// Pair a store with a name for strategy construction.
#[allow(dead_code)]
pub fn named(id: &str, store: Arc<dyn ObjectStore>) -> NamedStore {
    (id.to_string(), store)
}

/// An adapter over the given stores with a fresh in-memory index.
#[allow(dead_code)]
pub fn adapter(backing: Vec<NamedStore>, original: Vec<NamedStore>) -> FilerAdapter {
    adapter_with(backing, original, StrategyOptions::default())
}

#[allow(dead_code)]
pub fn adapter_with(
    backing: Vec<NamedStore>,
    original: Vec<NamedStore>,
    options: StrategyOptions,
) -> FilerAdapter {
    let repository: Box<dyn MetadataRepository> = Box::new(MemoryRepository::new());
    FilerAdapter::new(
        VOLUME,
        repository,
        Arc::new(BasicStrategy::new(backing, original, options)),
    )
}

/// A filesystem-backed volume that cleans up on drop.
#[allow(dead_code)]
pub struct TestVolume {
    pub adapter: FilerAdapter,
    pub store: Arc<FilesystemBackend>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestVolume {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = Arc::new(
            FilesystemBackend::new(temp_dir.path())
                .await
                .expect("Failed to create filesystem backend"),
        );
        let adapter = adapter(vec![named("local", store.clone())], vec![]);
        Self {
            adapter,
            store,
            _temp_dir: temp_dir,
        }
    }
}
