//! Physical location records for logical files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Prefix under which newly placed bytes are stored on a backend.
pub const OBJECT_PREFIX: &str = "objects";

/// A fresh physical key for newly placed bytes.
///
/// Keys never derive from the logical path, so renaming a file leaves its
/// old path free for new content. The first two byte pairs shard the key
/// space: `objects/ab/cd/abcd...`.
pub fn new_object_key() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{OBJECT_PREFIX}/{}/{}/{id}", &id[..2], &id[2..4])
}

/// Where a file lives on one backend.
///
/// `path` is the physical key on that backend. Any other fields a backend
/// wants to remember are kept verbatim in `extra`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLocation {
    pub path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiskLocation {
    /// Location with only a physical path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extra: Map::new(),
        }
    }
}

/// Mapping from backend identifier to the location of a file on that backend.
///
/// An empty record means the file has not been physically placed yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackingData(BTreeMap<String, DiskLocation>);

impl BackingData {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry record naming `disk` with the physical `path`.
    pub fn disk_and_path(disk: impl Into<String>, path: impl Into<String>) -> Self {
        let mut data = Self::new();
        data.add_disk(disk, DiskLocation::new(path));
        data
    }

    /// Add (or replace) the location on `disk`.
    pub fn add_disk(&mut self, disk: impl Into<String>, location: DiskLocation) -> &mut Self {
        self.0.insert(disk.into(), location);
        self
    }

    /// Remove the location on `disk`, returning it if present.
    pub fn remove_disk(&mut self, disk: &str) -> Option<DiskLocation> {
        self.0.remove(disk)
    }

    pub fn get_disk(&self, disk: &str) -> Option<&DiskLocation> {
        self.0.get(disk)
    }

    pub fn has_disk(&self, disk: &str) -> bool {
        self.0.contains_key(disk)
    }

    /// Backend identifiers recorded in this entry.
    pub fn disks(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_map(&self) -> BTreeMap<String, DiskLocation> {
        self.0.clone()
    }

    pub fn from_map(map: BTreeMap<String, DiskLocation>) -> Self {
        Self(map)
    }

    /// Serialize to a JSON object string.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON object string.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl FromIterator<(String, DiskLocation)> for BackingData {
    fn from_iter<I: IntoIterator<Item = (String, DiskLocation)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
