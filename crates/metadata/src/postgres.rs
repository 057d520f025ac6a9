//! PostgreSQL-based metadata repository.

use crate::error::{MetadataError, MetadataResult};
use crate::models::MetadataRow;
use crate::repository::{
    MetadataRepository, MetadataStream, error_stream, normalize_prefix, not_found,
};
use async_trait::async_trait;
use filer_core::config::PgSslMode;
use filer_core::{BackingData, Metadata, PATH_SEPARATOR, Visibility};
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

const LIST_RECURSIVE: &str = r#"
SELECT * FROM filer_metadata
WHERE disk = $1 AND starts_with(path, $2)
ORDER BY path COLLATE "C"
"#;

const LIST_DIRECT: &str = r#"
SELECT * FROM filer_metadata
WHERE disk = $1 AND starts_with(path, $2) AND strpos(substr(path, $3 + 1), $4) = 0
ORDER BY path COLLATE "C"
"#;

/// PostgreSQL-based metadata repository.
pub struct PostgresRepository {
    pool: Pool<Postgres>,
    storage_id: Option<String>,
}

impl PostgresRepository {
    /// Connect using a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        tracing::info!("Connecting to PostgreSQL using connection URL");
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// the environment.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);
        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL"
        );
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!(timeout_ms, "PostgreSQL statement_timeout set");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let repo = Self {
            pool,
            storage_id: None,
        };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataRepository for PostgresRepository {
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
            pool: self.pool.clone(),
            storage_id: Some(storage_id.to_string()),
        })
    }

    async fn get_metadata(&self, path: &str) -> MetadataResult<Option<Metadata>> {
        let disk = self.storage_id()?;
        let row = sqlx::query_as::<_, MetadataRow>(
            "SELECT * FROM filer_metadata WHERE disk = $1 AND path = $2",
        )
        .bind(disk)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Metadata::try_from).transpose()
    }

    async fn file_exists(&self, path: &str) -> MetadataResult<bool> {
        let disk = self.storage_id()?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM filer_metadata WHERE disk = $1 AND path = $2)",
        )
        .bind(disk)
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn directory_exists(&self, prefix: &str) -> MetadataResult<bool> {
        let disk = self.storage_id()?;
        let dir = normalize_prefix(prefix);
        if dir.is_empty() {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM filer_metadata WHERE disk = $1 AND starts_with(path, $2)
            ) AND NOT EXISTS(
                SELECT 1 FROM filer_metadata WHERE disk = $1 AND path = $3
            )
            "#,
        )
        .bind(disk)
        .bind(&dir)
        .bind(dir.trim_end_matches(PATH_SEPARATOR))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    fn list_contents<'a>(&'a self, prefix: &str, recursive: bool) -> MetadataStream<'a> {
        let disk = match self.storage_id() {
            Ok(id) => id,
            Err(e) => return error_stream(e),
        };
        let prefix = normalize_prefix(prefix);
        let pool = &self.pool;

        Box::pin(async_stream::stream! {
            let mut rows = if recursive {
                sqlx::query_as::<_, MetadataRow>(LIST_RECURSIVE)
                    .bind(disk)
                    .bind(&prefix)
                    .fetch(pool)
            } else {
                let length = prefix.chars().count() as i32;
                sqlx::query_as::<_, MetadataRow>(LIST_DIRECT)
                    .bind(disk)
                    .bind(&prefix)
                    .bind(length)
                    .bind(PATH_SEPARATOR.to_string())
                    .fetch(pool)
            };

            loop {
                match rows.try_next().await {
                    Ok(Some(row)) => yield Metadata::try_from(row),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(MetadataError::from(e));
                        break;
                    }
                }
            }
        })
    }

    async fn record(&self, metadata: &Metadata) -> MetadataResult<Metadata> {
        let disk = self.storage_id()?;

        // A supplied id already in use falls back to a fresh one. The upsert
        // keeps the id of any row already at this path.
        let candidate = match metadata.id {
            Some(supplied) => {
                let taken: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM filer_metadata WHERE id = $1)")
                        .bind(supplied)
                        .fetch_one(&self.pool)
                        .await?;
                if taken { Uuid::new_v4() } else { supplied }
            }
            None => Uuid::new_v4(),
        };

        let mut row = MetadataRow::from_metadata(disk, candidate, metadata)?;
        row.id = sqlx::query_scalar(
            r#"
            INSERT INTO filer_metadata (
                id, disk, path, size, mimetype, etag, visibility,
                backing_data, timestamp, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (disk, path) DO UPDATE SET
                size = EXCLUDED.size,
                mimetype = EXCLUDED.mimetype,
                etag = EXCLUDED.etag,
                visibility = EXCLUDED.visibility,
                backing_data = EXCLUDED.backing_data,
                timestamp = EXCLUDED.timestamp,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(row.id)
        .bind(&row.disk)
        .bind(&row.path)
        .bind(row.size)
        .bind(&row.mimetype)
        .bind(&row.etag)
        .bind(&row.visibility)
        .bind(&row.backing_data)
        .bind(row.timestamp)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Metadata::try_from(row)
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> MetadataResult<()> {
        let disk = self.storage_id()?;
        let result = sqlx::query(
            "UPDATE filer_metadata SET visibility = $1 WHERE disk = $2 AND path = $3",
        )
        .bind(visibility.as_str())
        .bind(disk)
        .bind(path)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(disk, path));
        }
        Ok(())
    }

    async fn set_backing_data(
        &self,
        path: &str,
        backing_data: &BackingData,
    ) -> MetadataResult<()> {
        let disk = self.storage_id()?;
        let result = sqlx::query(
            "UPDATE filer_metadata SET backing_data = $1 WHERE disk = $2 AND path = $3",
        )
        .bind(Json(backing_data.clone()))
        .bind(disk)
        .bind(path)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(disk, path));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> MetadataResult<()> {
        let disk = self.storage_id()?;
        sqlx::query("DELETE FROM filer_metadata WHERE disk = $1 AND path = $2")
            .bind(disk)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> MetadataResult<()> {
        let disk = self.storage_id()?;
        let mut tx = self.pool.begin().await?;

        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM filer_metadata WHERE disk = $1 AND path = $2 FOR UPDATE",
        )
        .bind(disk)
        .bind(from)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(id) = id else {
            return Err(not_found(disk, from));
        };

        if from != to {
            sqlx::query("DELETE FROM filer_metadata WHERE disk = $1 AND path = $2")
                .bind(disk)
                .bind(to)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE filer_metadata SET path = $1 WHERE id = $2")
                .bind(to)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
