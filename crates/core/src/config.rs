//! Configuration types shared across crates.

use crate::Error;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "FILER_";

/// Top-level configuration: named stores, one metadata repository, and the
/// volumes built from them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilerConfig {
    /// Physical stores by name. Volumes refer to these names.
    #[serde(default)]
    pub stores: BTreeMap<String, StorageConfig>,
    /// Metadata repository shared by every volume.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Logical volumes.
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

impl FilerConfig {
    /// Load configuration from an optional TOML file, overridden by
    /// `FILER_`-prefixed environment variables (`__` separates nesting levels,
    /// e.g. `FILER_METADATA__PATH`).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides).
    pub fn from_toml(source: &str) -> crate::Result<Self> {
        let config: Self = Figment::new().merge(Toml::string(source)).extract()?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Validate cross-references and per-section invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (name, store) in &self.stores {
            store
                .validate()
                .map_err(|e| format!("store '{name}': {e}"))?;
        }
        self.metadata.validate()?;

        let mut seen = HashSet::new();
        for volume in &self.volumes {
            if volume.id.trim().is_empty() {
                return Err("volume id must not be empty".to_string());
            }
            if !seen.insert(volume.id.as_str()) {
                return Err(format!("duplicate volume id '{}'", volume.id));
            }
            if volume.backing.is_empty() {
                return Err(format!(
                    "volume '{}' requires at least one backing store",
                    volume.id
                ));
            }
            for store in volume.backing.iter().chain(&volume.original) {
                if !self.stores.contains_key(store) {
                    return Err(format!(
                        "volume '{}' references undefined store '{}'",
                        volume.id, store
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One logical volume (a namespace in the metadata index).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Storage id; partitions the metadata index.
    pub id: String,
    /// Write-eligible stores, in priority order.
    pub backing: Vec<String>,
    /// Legacy stores consulted for files not yet indexed.
    #[serde(default)]
    pub original: Vec<String>,
    #[serde(default)]
    pub options: StrategyOptions,
}

/// Options for the write/read routing strategy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyOptions {
    /// Let new files land on original stores once every backing store refused.
    #[serde(default)]
    pub allow_new_files_on_original_stores: bool,
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient AWS credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
    /// Process-local memory. Contents vanish on exit.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Metadata repository configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// In-process map (testing only).
    Memory,
    /// Single JSON document rewritten on every mutation. Small catalogs and
    /// single-process use only.
    Json {
        path: PathBuf,
    },
    /// SQLite database.
    Sqlite {
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer FILER_METADATA__PASSWORD over storing this in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default)]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Json {
            path: PathBuf::from("./data/filer-metadata.json"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [stores.local]
        type = "filesystem"
        path = "/var/lib/filer"

        [stores.scratch]
        type = "memory"

        [stores.legacy]
        type = "s3"
        bucket = "old-bucket"
        region = "eu-west-1"

        [metadata]
        type = "sqlite"
        path = "/var/lib/filer/meta.db"

        [[volumes]]
        id = "uploads"
        backing = ["local", "scratch"]
        original = ["legacy"]

        [volumes.options]
        allow_new_files_on_original_stores = true
    "#;

    #[test]
    fn test_parse_sample() {
        let config = FilerConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.stores.len(), 3);
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));

        let volume = &config.volumes[0];
        assert_eq!(volume.id, "uploads");
        assert_eq!(volume.backing, vec!["local", "scratch"]);
        assert_eq!(volume.original, vec!["legacy"]);
        assert!(volume.options.allow_new_files_on_original_stores);
    }

    #[test]
    fn test_defaults() {
        let config = FilerConfig::from_toml("").unwrap();
        assert!(config.volumes.is_empty());
        assert!(matches!(config.metadata, MetadataConfig::Json { .. }));
    }

    #[test]
    fn test_rejects_undefined_store() {
        let source = r#"
            [stores.local]
            type = "memory"

            [[volumes]]
            id = "v"
            backing = ["local", "missing"]
        "#;
        let err = FilerConfig::from_toml(source).unwrap_err();
        assert!(err.to_string().contains("undefined store 'missing'"));
    }

    #[test]
    fn test_rejects_empty_backing() {
        let source = r#"
            [[volumes]]
            id = "v"
            backing = []
        "#;
        let err = FilerConfig::from_toml(source).unwrap_err();
        assert!(err.to_string().contains("at least one backing store"));
    }

    #[test]
    fn test_rejects_duplicate_volume() {
        let source = r#"
            [stores.m]
            type = "memory"

            [[volumes]]
            id = "v"
            backing = ["m"]

            [[volumes]]
            id = "v"
            backing = ["m"]
        "#;
        let err = FilerConfig::from_toml(source).unwrap_err();
        assert!(err.to_string().contains("duplicate volume id"));
    }

    #[test]
    fn test_rejects_partial_s3_credentials() {
        let store = StorageConfig::S3 {
            bucket: "b".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_target() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: Some("db".to_string()),
            port: None,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 5,
            statement_timeout_ms: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filer.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FilerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.volumes.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = FilerConfig::load(Some(Path::new("/nonexistent/filer.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
