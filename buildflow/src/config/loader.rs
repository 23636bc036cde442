//! JSON configuration loading with an optional, explicit cache.

use crate::errors::{BuildflowError, Result};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads optional JSON configuration files.
///
/// A missing file is not an error: [`ConfigLoader::load_json`] returns
/// `Ok(None)`. When constructed with [`ConfigLoader::with_cache`], parsed
/// results (including "missing") are memoised per path until invalidated.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    cache: Option<DashMap<PathBuf, Option<Value>>>,
}

impl ConfigLoader {
    /// Creates a loader that reads from disk on every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader that memoises results per path.
    #[must_use]
    pub fn with_cache() -> Self {
        Self {
            cache: Some(DashMap::new()),
        }
    }

    /// Returns true if results are memoised.
    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Loads a JSON object from `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist. Any other read error
    /// is returned unchanged; malformed JSON or a non-object root yields
    /// [`BuildflowError::ConfigurationInvalid`].
    pub async fn load_json(&self, path: &Path) -> Result<Option<Value>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(path) {
                debug!(path = %path.display(), "Configuration cache hit");
                return Ok(hit.value().clone());
            }
        }

        let loaded = read_json(path).await?;

        if let Some(cache) = &self.cache {
            cache.insert(path.to_path_buf(), loaded.clone());
        }
        Ok(loaded)
    }

    /// Loads and deserialises a configuration file.
    pub async fn load_typed<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match self.load_json(path).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| BuildflowError::configuration_invalid(path, e.to_string())),
            None => Ok(None),
        }
    }

    /// Drops the cached result for `path`. Returns true if one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cache| cache.remove(path).is_some())
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Returns the cached paths, sorted.
    #[must_use]
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .cache
            .iter()
            .flat_map(|cache| cache.iter().map(|entry| entry.key().clone()))
            .collect();
        paths.sort();
        paths
    }
}

async fn read_json(path: &Path) -> Result<Option<Value>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Configuration file not found");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| BuildflowError::configuration_invalid(path, e.to_string()))?;

    if !value.is_object() {
        return Err(BuildflowError::configuration_invalid(
            path,
            "expected a JSON object at the top level",
        ));
    }

    Ok(Some(value))
}
