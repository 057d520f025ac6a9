//! Core value types for the filer storage indirection layer.
//!
//! This crate defines the data model shared by every other crate:
//! - `BackingData`: which physical backends hold a file, and where
//! - `Metadata`: the logical file record kept in the index
//! - Content fingerprints and mimetype detection
//! - Configuration for stores, metadata repositories and volumes

pub mod backing_data;
pub mod config;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod mime;

pub use backing_data::{BackingData, DiskLocation, new_object_key};
pub use config::{FilerConfig, MetadataConfig, StorageConfig, StrategyOptions, VolumeConfig};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use metadata::{Metadata, Visibility, now_epoch};

/// Separator between path segments in logical paths.
pub const PATH_SEPARATOR: char = '/';
