use serde::{Deserialize, Serialize};

use crate::error::{DocStoreError, Result};

fn default_store_name() -> String {
    "cache".to_string()
}

fn default_index_name() -> String {
    "lastUpdate".to_string()
}

/// Configuration of a [`CacheLayer`](super::CacheLayer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Name of the local database. Required.
    pub cache_name: String,
    /// Table holding the cached rows.
    #[serde(default = "default_store_name")]
    pub store_name: String,
    /// Secondary `(parent, lastUpdate, id)` index.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Wipe the store right after it opens. Meant for development resets.
    #[serde(default)]
    pub clear_on_start: bool,
}

impl CacheConfig {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            store_name: default_store_name(),
            index_name: default_index_name(),
            clear_on_start: false,
        }
    }

    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    pub fn clear_on_start(mut self, clear: bool) -> Self {
        self.clear_on_start = clear;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("cacheName", &self.cache_name),
            ("storeName", &self.store_name),
            ("indexName", &self.index_name),
        ] {
            if value.is_empty() {
                return Err(DocStoreError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}
