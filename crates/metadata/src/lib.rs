//! Metadata index for the filer.
//!
//! The index maps `(storage id, logical path)` to a [`Metadata`] record that
//! says which physical stores hold the bytes. This crate provides:
//! - The `MetadataRepository` contract
//! - Backends: in-memory, JSON document, SQLite and PostgreSQL
//!
//! [`Metadata`]: filer_core::Metadata

mod catalog;
pub mod error;
pub mod json;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod sqlite;

pub use error::{MetadataError, MetadataResult};
pub use json::JsonRepository;
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
pub use repository::{MetadataRepository, MetadataStream, normalize_prefix};
pub use sqlite::SqliteRepository;

use filer_core::config::MetadataConfig;

/// Open a metadata repository from configuration.
///
/// No storage id is selected on the returned repository; use
/// [`MetadataRepository::scoped`] or [`MetadataRepository::set_storage_id`].
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Box<dyn MetadataRepository>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Memory => Ok(Box::new(MemoryRepository::new())),
        MetadataConfig::Json { path } => Ok(Box::new(JsonRepository::open(path).await?)),
        MetadataConfig::Sqlite { path } => Ok(Box::new(SqliteRepository::new(path).await?)),
        MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let repo = if let Some(url) = url {
                PostgresRepository::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresRepository::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Box::new(repo))
        }
    }
}
