//! Repository fixtures shared by the integration tests.

use filer_metadata::{
    JsonRepository, MemoryRepository, MetadataError, MetadataRepository, MetadataResult,
    PostgresRepository, SqliteRepository,
};
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A repository plus whatever keeps its storage alive.
pub struct TestRepository {
    repo: Box<dyn MetadataRepository>,
    _temp_dir: Option<TempDir>,
    _container: Option<ContainerAsync<Postgres>>,
}

impl TestRepository {
    pub fn memory() -> Self {
        Self {
            repo: Box::new(MemoryRepository::new()),
            _temp_dir: None,
            _container: None,
        }
    }

    pub async fn json() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let repo = JsonRepository::open(temp_dir.path().join("metadata.json")).await?;
        Ok(Self {
            repo: Box::new(repo),
            _temp_dir: Some(temp_dir),
            _container: None,
        })
    }

    pub async fn sqlite() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let repo = SqliteRepository::new(temp_dir.path().join("metadata.db")).await?;
        Ok(Self {
            repo: Box::new(repo),
            _temp_dir: Some(temp_dir),
            _container: None,
        })
    }

    pub async fn postgres() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let repo = PostgresRepository::from_url(&url, 5, Some(30_000)).await?;

        Ok(Self {
            repo: Box::new(repo),
            _temp_dir: None,
            _container: Some(container),
        })
    }

    /// Handle with `storage_id` selected.
    pub fn scoped(&self, storage_id: &str) -> Box<dyn MetadataRepository> {
        self.repo.scoped(storage_id)
    }
}

/// Start a PostgreSQL repository, or `None` when Docker is unavailable or
/// SKIP_POSTGRES_TESTS is set.
///
/// Only container-start failures cause a skip; schema or connection errors
/// still panic.
pub async fn postgres_or_skip() -> Option<TestRepository> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match TestRepository::postgres().await {
        Ok(repo) => Some(repo),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}
