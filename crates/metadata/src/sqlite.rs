//! SQLite-based metadata repository.

use crate::error::{MetadataError, MetadataResult};
use crate::models::MetadataRow;
use crate::repository::{
    MetadataRepository, MetadataStream, error_stream, normalize_prefix, not_found,
};
use async_trait::async_trait;
use filer_core::{BackingData, Metadata, PATH_SEPARATOR, Visibility};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS filer_metadata (
    id BLOB PRIMARY KEY,
    disk TEXT NOT NULL,
    path TEXT NOT NULL,
    size INTEGER NOT NULL,
    mimetype TEXT NOT NULL,
    etag TEXT,
    visibility TEXT NOT NULL CHECK (visibility IN ('public', 'private')),
    backing_data TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (disk, path)
);
"#;

const SELECT_BY_PATH: &str = "SELECT * FROM filer_metadata WHERE disk = ? AND path = ?";

const LIST_RECURSIVE: &str = r#"
SELECT * FROM filer_metadata
WHERE disk = ? AND substr(path, 1, ?) = ?
ORDER BY path
"#;

const LIST_DIRECT: &str = r#"
SELECT * FROM filer_metadata
WHERE disk = ? AND substr(path, 1, ?) = ? AND instr(substr(path, ? + 1), ?) = 0
ORDER BY path
"#;

/// SQLite-based metadata repository.
pub struct SqliteRepository {
    pool: Pool<Sqlite>,
    storage_id: Option<String>,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection avoids "database is locked" under concurrent tasks.
        // Listing streams hold it until drained.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let repo = Self {
            pool,
            storage_id: None,
        };
        repo.migrate().await?;
        tracing::info!(path = %path.display(), "Opened SQLite metadata repository");
        Ok(repo)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataRepository for SqliteRepository {
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
        let row = sqlx::query_as::<_, MetadataRow>(SELECT_BY_PATH)
            .bind(disk)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Metadata::try_from).transpose()
    }

    async fn file_exists(&self, path: &str) -> MetadataResult<bool> {
        let disk = self.storage_id()?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM filer_metadata WHERE disk = ? AND path = ?)",
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
        // substr/instr compare exactly; LIKE would be case-insensitive.
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM filer_metadata
                WHERE disk = ? AND substr(path, 1, ?) = ?
            ) AND NOT EXISTS(
                SELECT 1 FROM filer_metadata WHERE disk = ? AND path = ?
            )
            "#,
        )
        .bind(disk)
        .bind(dir.chars().count() as i64)
        .bind(&dir)
        .bind(disk)
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
            let length = prefix.chars().count() as i64;
            let mut rows = if recursive {
                sqlx::query_as::<_, MetadataRow>(LIST_RECURSIVE)
                    .bind(disk)
                    .bind(length)
                    .bind(&prefix)
                    .fetch(pool)
            } else {
                sqlx::query_as::<_, MetadataRow>(LIST_DIRECT)
                    .bind(disk)
                    .bind(length)
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
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM filer_metadata WHERE id = ?)")
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
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (disk, path) DO UPDATE SET
                size = excluded.size,
                mimetype = excluded.mimetype,
                etag = excluded.etag,
                visibility = excluded.visibility,
                backing_data = excluded.backing_data,
                timestamp = excluded.timestamp,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
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
        let result =
            sqlx::query("UPDATE filer_metadata SET visibility = ? WHERE disk = ? AND path = ?")
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
        let result =
            sqlx::query("UPDATE filer_metadata SET backing_data = ? WHERE disk = ? AND path = ?")
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
        sqlx::query("DELETE FROM filer_metadata WHERE disk = ? AND path = ?")
            .bind(disk)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> MetadataResult<()> {
        let disk = self.storage_id()?;
        let mut tx = self.pool.begin().await?;

        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM filer_metadata WHERE disk = ? AND path = ?")
                .bind(disk)
                .bind(from)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(id) = id else {
            return Err(not_found(disk, from));
        };

        if from != to {
            sqlx::query("DELETE FROM filer_metadata WHERE disk = ? AND path = ?")
                .bind(disk)
                .bind(to)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE filer_metadata SET path = ? WHERE id = ?")
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
