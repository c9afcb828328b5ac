//! In-process options for registry combination, records and caching.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Default capacity of a [`crate::ClassificationCache`] built from config.
pub const DEFAULT_CLASSIFICATION_CACHE_CAPACITY: usize = 1024;

/// How entities are projected into canonical records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordOptions {
    /// Return dynamic fields under `dynamic_properties` instead of merging
    /// them into `properties`.
    pub separate_dynamic_properties: bool,
    /// Render property containers as JSON text.
    pub encode_containers: bool,
}

/// Catalog-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Reject duplicate keys when combining registries.
    pub strict_combine: bool,
    /// Record rendering options.
    pub records: RecordOptions,
    /// Zero disables classification caching.
    pub classification_cache_capacity: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            strict_combine: true,
            records: RecordOptions::default(),
            classification_cache_capacity: DEFAULT_CLASSIFICATION_CACHE_CAPACITY,
        }
    }
}

impl CatalogConfig {
    /// Parses options from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON or wrong value types.
    pub fn from_json(text: &str) -> CatalogResult<Self> {
        serde_json::from_str(text).map_err(|e| CatalogError::config(e.to_string()))
    }
}
