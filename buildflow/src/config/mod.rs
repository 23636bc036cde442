//! Configuration for stages and runners.
//!
//! This module provides:
//! - The build configuration (build folder and its conventional subfolders)
//! - An optional-file JSON loader with an explicit cache
//! - The layered `defaults < file < options` merge

mod loader;
mod merge;

pub use loader::ConfigLoader;
pub use merge::merge_layers;

use crate::utils::resolve_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project configuration folder.
pub const CONFIG_FOLDER_NAME: &str = ".buildflow";

/// Name of the build cache folder inside the configuration folder.
pub const BUILD_CACHE_FOLDER_NAME: &str = "build-cache";

/// Locations derived from the project being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    /// The project root.
    pub build_folder: PathBuf,
    /// Folder holding per-stage configuration files.
    pub config_folder: PathBuf,
    /// Folder the build tool uses for its own cache.
    pub build_cache_folder: PathBuf,
}

impl BuildConfiguration {
    /// Creates the configuration for a project root.
    ///
    /// A relative `build_folder` is resolved against the current directory.
    pub fn new(build_folder: impl AsRef<Path>) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::with_root(resolve_path(&cwd, build_folder.as_ref())))
    }

    /// Creates the configuration for an absolute project root.
    #[must_use]
    pub fn with_root(build_folder: PathBuf) -> Self {
        let config_folder = build_folder.join(CONFIG_FOLDER_NAME);
        let build_cache_folder = config_folder.join(BUILD_CACHE_FOLDER_NAME);
        Self {
            build_folder,
            config_folder,
            build_cache_folder,
        }
    }

    /// Returns the conventional configuration file for a stage.
    #[must_use]
    pub fn stage_config_path(&self, stage: &str) -> PathBuf {
        self.config_folder.join(format!("{stage}.json"))
    }
}
