//! Logical file records.

use crate::backing_data::BackingData;
use crate::{hash, mime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Logical visibility of a file.
///
/// This lives in the index only; it is never pushed down to backend ACLs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(crate::Error::InvalidVisibility(other.to_string())),
        }
    }
}

/// Current time as epoch seconds.
pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// The index record for one logical file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMetadata")]
pub struct Metadata {
    /// Assigned by the repository on first insert.
    pub id: Option<Uuid>,
    pub path: String,
    pub size: u64,
    pub mimetype: String,
    pub etag: Option<String>,
    pub visibility: Visibility,
    pub created_at: i64,
    pub updated_at: i64,
    pub timestamp: i64,
    pub backing_data: BackingData,
}

impl Metadata {
    /// Empty record for `path` stamped with the current time.
    pub fn new(path: impl Into<String>) -> Self {
        let now = now_epoch();
        Self {
            id: None,
            path: path.into(),
            size: 0,
            mimetype: mime::DEFAULT_MIMETYPE.to_string(),
            etag: None,
            visibility: Visibility::default(),
            created_at: now,
            updated_at: now,
            timestamp: now,
            backing_data: BackingData::new(),
        }
    }

    /// Derive a record from file content.
    pub fn generate(path: impl Into<String>, content: &[u8]) -> Self {
        let mut metadata = Self::new(path);
        metadata.apply_content(content);
        metadata
    }

    /// Replace the content-derived attributes after the file content changed.
    pub fn update_contents(&mut self, content: &[u8]) -> &mut Self {
        self.apply_content(content);
        let now = now_epoch();
        self.updated_at = now;
        self.timestamp = now;
        self
    }

    fn apply_content(&mut self, content: &[u8]) {
        self.size = content.len() as u64;
        self.mimetype = mime::detect(&self.path, content);
        self.etag = Some(hash::etag(content));
    }

    pub fn with_backing_data(mut self, backing_data: BackingData) -> Self {
        self.backing_data = backing_data;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set every timestamp to `timestamp`.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.created_at = timestamp;
        self.updated_at = timestamp;
        self.timestamp = timestamp;
        self
    }

    /// Same record under a new logical path.
    pub fn renamed(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// A new record at `path` carrying this record's content attributes.
    ///
    /// The id is cleared so the repository assigns a fresh one.
    pub fn copied_to(&self, path: impl Into<String>, backing_data: BackingData) -> Self {
        let now = now_epoch();
        Self {
            id: None,
            path: path.into(),
            size: self.size,
            mimetype: self.mimetype.clone(),
            etag: self.etag.clone(),
            visibility: self.visibility,
            created_at: now,
            updated_at: now,
            timestamp: now,
            backing_data,
        }
    }
}

/// Lenient on-disk form; older documents omit several fields.
#[derive(Deserialize)]
struct RawMetadata {
    #[serde(default)]
    id: Option<Uuid>,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    updated_at: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    backing_data: BackingData,
}

impl From<RawMetadata> for Metadata {
    fn from(raw: RawMetadata) -> Self {
        let timestamp = raw
            .timestamp
            .or(raw.updated_at)
            .or(raw.created_at)
            .unwrap_or(0);
        Self {
            id: raw.id,
            path: raw.path,
            size: raw.size,
            mimetype: raw
                .mimetype
                .unwrap_or_else(|| mime::DEFAULT_MIMETYPE.to_string()),
            etag: raw.etag.filter(|etag| !etag.is_empty()),
            visibility: raw.visibility.unwrap_or_default(),
            created_at: raw.created_at.unwrap_or(timestamp),
            updated_at: raw.updated_at.unwrap_or(timestamp),
            timestamp,
            backing_data: raw.backing_data,
        }
    }
}
