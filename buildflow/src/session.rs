//! The explicit context handed to every stage and runner call.

use crate::config::{BuildConfiguration, ConfigLoader};
use crate::logging::LoggingManager;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage or runner may touch during one pipeline run.
///
/// There is no ambient state: stages receive the session by reference and
/// request their loggers and configuration through it.
#[derive(Debug)]
pub struct BuildSession {
    run_id: Uuid,
    build: BuildConfiguration,
    logging: Arc<LoggingManager>,
    config: ConfigLoader,
}

impl BuildSession {
    /// Creates a session with tracing-backed logging and an uncached loader.
    #[must_use]
    pub fn new(build: BuildConfiguration) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            build,
            logging: Arc::new(LoggingManager::default()),
            config: ConfigLoader::new(),
        }
    }

    /// Replaces the logging manager.
    #[must_use]
    pub fn with_logging(mut self, logging: Arc<LoggingManager>) -> Self {
        self.logging = logging;
        self
    }

    /// Replaces the configuration loader.
    #[must_use]
    pub fn with_config_loader(mut self, config: ConfigLoader) -> Self {
        self.config = config;
        self
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the build configuration.
    #[must_use]
    pub fn build(&self) -> &BuildConfiguration {
        &self.build
    }

    /// Returns the logging manager.
    #[must_use]
    pub fn logging(&self) -> &Arc<LoggingManager> {
        &self.logging
    }

    /// Returns the configuration loader.
    #[must_use]
    pub fn config(&self) -> &ConfigLoader {
        &self.config
    }
}
