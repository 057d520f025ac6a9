//! Database row model for the relational repositories.

use crate::error::{MetadataError, MetadataResult};
use filer_core::{BackingData, Metadata};
use sqlx::FromRow;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// One row of `filer_metadata`.
#[derive(Debug, Clone, FromRow)]
pub struct MetadataRow {
    pub id: Uuid,
    /// Storage id (namespace) the row belongs to.
    pub disk: String,
    pub path: String,
    pub size: i64,
    pub mimetype: String,
    pub etag: Option<String>,
    pub visibility: String,
    pub backing_data: Json<BackingData>,
    pub timestamp: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

fn datetime(epoch: i64) -> MetadataResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map_err(|e| MetadataError::Internal(format!("timestamp {epoch} out of range: {e}")))
}

impl MetadataRow {
    /// Row for `metadata` in namespace `disk` with the resolved `id`.
    pub fn from_metadata(disk: &str, id: Uuid, metadata: &Metadata) -> MetadataResult<Self> {
        let size = i64::try_from(metadata.size)
            .map_err(|_| MetadataError::Internal(format!("size {} too large", metadata.size)))?;
        Ok(Self {
            id,
            disk: disk.to_string(),
            path: metadata.path.clone(),
            size,
            mimetype: metadata.mimetype.clone(),
            etag: metadata.etag.clone(),
            visibility: metadata.visibility.as_str().to_string(),
            backing_data: Json(metadata.backing_data.clone()),
            timestamp: datetime(metadata.timestamp)?,
            created_at: datetime(metadata.created_at)?,
            updated_at: datetime(metadata.updated_at)?,
        })
    }
}

impl TryFrom<MetadataRow> for Metadata {
    type Error = MetadataError;

    fn try_from(row: MetadataRow) -> MetadataResult<Self> {
        let visibility = row
            .visibility
            .parse()
            .map_err(|e| MetadataError::Internal(format!("row {}: {e}", row.id)))?;
        Ok(Metadata {
            id: Some(row.id),
            path: row.path,
            size: row.size.max(0) as u64,
            mimetype: row.mimetype,
            etag: row.etag,
            visibility,
            created_at: row.created_at.unix_timestamp(),
            updated_at: row.updated_at.unix_timestamp(),
            timestamp: row.timestamp.unix_timestamp(),
            backing_data: row.backing_data.0,
        })
    }
}
