//! Runtime re-binding of data sources and cache parameters.
//!
//! Payload shape (every key optional):
//!
//! ```json
//! {
//!   "dataSource": "main",
//!   "secondaryDataSource": "replica",
//!   "versionDataSource": "",
//!   "cache": { "region": "articles", "ttlSeconds": 300 }
//! }
//! ```
//!
//! An absent key keeps the current binding. An empty string clears an
//! optional binding. `"cache": { "enabled": false }` removes the cache binding.

use super::entity::{CacheBinding, DataSourceNames};
use crate::core::{MapperError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntitySettings {
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub secondary_data_source: Option<String>,
    #[serde(default)]
    pub version_data_source: Option<String>,
    #[serde(default)]
    pub trash_data_source: Option<String>,
    #[serde(default)]
    pub sync_data_source: Option<String>,
    #[serde(default)]
    pub cache: Option<CacheSettings>,
}

impl EntitySettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MapperError::precondition(format!("Invalid entity settings: {}", e)))
    }

    /// Data-source names this payload binds (cleared bindings excluded).
    pub fn referenced_sources(&self) -> Vec<&str> {
        [
            &self.data_source,
            &self.secondary_data_source,
            &self.version_data_source,
            &self.trash_data_source,
            &self.sync_data_source,
        ]
        .into_iter()
        .filter_map(|name| name.as_deref())
        .filter(|name| !name.is_empty())
        .collect()
    }

    /// Compute the new bindings. Pure: the caller validates names and swaps descriptors.
    pub fn apply(
        &self,
        current: &DataSourceNames,
        cache: Option<&CacheBinding>,
    ) -> Result<(DataSourceNames, Option<CacheBinding>)> {
        let primary = match self.data_source.as_deref() {
            Some("") => {
                return Err(MapperError::precondition(
                    "The primary data source cannot be cleared",
                ));
            }
            Some(name) => name.to_string(),
            None => current.primary.clone(),
        };

        let names = DataSourceNames {
            primary,
            secondary: rebind(&self.secondary_data_source, &current.secondary),
            version: rebind(&self.version_data_source, &current.version),
            trash: rebind(&self.trash_data_source, &current.trash),
            sync: rebind(&self.sync_data_source, &current.sync),
        };

        let cache = match &self.cache {
            None => cache.cloned(),
            Some(settings) if settings.enabled == Some(false) => None,
            Some(settings) => {
                let region = settings
                    .region
                    .clone()
                    .or_else(|| cache.map(|c| c.region.clone()))
                    .filter(|region| !region.is_empty())
                    .ok_or_else(|| {
                        MapperError::precondition("Cache settings require a region")
                    })?;
                Some(CacheBinding {
                    region,
                    ttl_seconds: settings
                        .ttl_seconds
                        .or_else(|| cache.and_then(|c| c.ttl_seconds)),
                })
            }
        };

        Ok((names, cache))
    }
}

fn rebind(requested: &Option<String>, current: &Option<String>) -> Option<String> {
    match requested.as_deref() {
        None => current.clone(),
        Some("") => None,
        Some(name) => Some(name.to_string()),
    }
}
