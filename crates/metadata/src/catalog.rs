//! In-memory catalog shared by the memory and JSON repositories.

use crate::error::MetadataResult;
use crate::repository::{in_listing, normalize_prefix, not_found};
use filer_core::{BackingData, Metadata, PATH_SEPARATOR, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Records of one namespace, keyed by path.
pub(crate) type Namespace = BTreeMap<String, Metadata>;

/// Every namespace's records: `{ storage_id: { path: Metadata } }`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Catalog(BTreeMap<String, Namespace>);

impl Catalog {
    /// Make each record's path agree with its key.
    pub(crate) fn normalize(&mut self) {
        for namespace in self.0.values_mut() {
            for (path, metadata) in namespace.iter_mut() {
                if metadata.path != *path {
                    metadata.path = path.clone();
                }
            }
        }
    }

    fn namespace(&self, storage_id: &str) -> Option<&Namespace> {
        self.0.get(storage_id)
    }

    pub(crate) fn get(&self, storage_id: &str, path: &str) -> Option<&Metadata> {
        self.namespace(storage_id)?.get(path)
    }

    fn get_mut(&mut self, storage_id: &str, path: &str) -> MetadataResult<&mut Metadata> {
        self.0
            .get_mut(storage_id)
            .and_then(|namespace| namespace.get_mut(path))
            .ok_or_else(|| not_found(storage_id, path))
    }

    fn id_in_use(&self, id: Uuid) -> bool {
        self.0
            .values()
            .flat_map(|namespace| namespace.values())
            .any(|metadata| metadata.id == Some(id))
    }

    pub(crate) fn record(&mut self, storage_id: &str, metadata: &Metadata) -> Metadata {
        let existing = self.get(storage_id, &metadata.path).and_then(|m| m.id);
        let id = existing
            .or(metadata.id.filter(|id| !self.id_in_use(*id)))
            .unwrap_or_else(Uuid::new_v4);

        let mut stored = metadata.clone();
        stored.id = Some(id);
        self.0
            .entry(storage_id.to_string())
            .or_default()
            .insert(stored.path.clone(), stored.clone());
        stored
    }

    pub(crate) fn set_visibility(
        &mut self,
        storage_id: &str,
        path: &str,
        visibility: Visibility,
    ) -> MetadataResult<()> {
        self.get_mut(storage_id, path)?.visibility = visibility;
        Ok(())
    }

    pub(crate) fn set_backing_data(
        &mut self,
        storage_id: &str,
        path: &str,
        backing_data: &BackingData,
    ) -> MetadataResult<()> {
        self.get_mut(storage_id, path)?.backing_data = backing_data.clone();
        Ok(())
    }

    /// Returns whether a record was removed.
    pub(crate) fn delete(&mut self, storage_id: &str, path: &str) -> bool {
        self.0
            .get_mut(storage_id)
            .is_some_and(|namespace| namespace.remove(path).is_some())
    }

    pub(crate) fn rename(&mut self, storage_id: &str, from: &str, to: &str) -> MetadataResult<()> {
        let namespace = self
            .0
            .get_mut(storage_id)
            .ok_or_else(|| not_found(storage_id, from))?;
        let metadata = namespace
            .remove(from)
            .ok_or_else(|| not_found(storage_id, from))?
            .renamed(to);
        namespace.insert(to.to_string(), metadata);
        Ok(())
    }

    pub(crate) fn list(&self, storage_id: &str, prefix: &str, recursive: bool) -> Vec<Metadata> {
        let prefix = normalize_prefix(prefix);
        let Some(namespace) = self.namespace(storage_id) else {
            return Vec::new();
        };
        namespace
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| in_listing(path, &prefix, recursive))
            .map(|(_, metadata)| metadata.clone())
            .collect()
    }

    pub(crate) fn directory_exists(&self, storage_id: &str, prefix: &str) -> bool {
        let dir = normalize_prefix(prefix);
        if dir.is_empty() {
            return true;
        }
        let Some(namespace) = self.namespace(storage_id) else {
            return false;
        };
        if namespace.contains_key(dir.trim_end_matches(PATH_SEPARATOR)) {
            return false;
        }
        namespace
            .range(dir.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(&dir))
    }
}
