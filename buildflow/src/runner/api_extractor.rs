//! Runner for the API report extraction tool.

use super::diagnostics::{DiagnosticClassifier, DiagnosticMessage};
use super::tool::{DiagnosticTool, ToolRequest};
use super::{evaluate_outcome, log_summary, Runner, RunnerResult};
use crate::errors::{BuildflowError, Result};
use crate::logging::ScopedLogger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Everything one API extraction needs. Built by the caller, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExtractorRunnerConfiguration {
    /// The tool's own configuration file.
    pub tool_config_file_location: PathBuf,
    /// Where the tool package is installed.
    pub tool_package_path: PathBuf,
    /// Alternative compiler installation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_compiler_path: Option<PathBuf>,
    /// Project root; diagnostics under it are logged with relative paths.
    pub build_folder: PathBuf,
    /// Treat report drift as fatal.
    pub production: bool,
}

/// Runs an API extraction tool and classifies its diagnostics.
pub struct ApiExtractorRunner {
    tool: Arc<dyn DiagnosticTool>,
}

impl ApiExtractorRunner {
    /// Wraps a loaded tool.
    #[must_use]
    pub fn new(tool: Arc<dyn DiagnosticTool>) -> Self {
        Self { tool }
    }
}

impl fmt::Debug for ApiExtractorRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiExtractorRunner")
            .field("tool", &self.tool.name())
            .finish()
    }
}

#[async_trait]
impl Runner for ApiExtractorRunner {
    type Config = ApiExtractorRunnerConfiguration;

    fn name(&self) -> &str {
        "api-extractor"
    }

    async fn invoke(
        &self,
        config: &ApiExtractorRunnerConfiguration,
        logger: Arc<ScopedLogger>,
    ) -> Result<RunnerResult> {
        let tool = Arc::clone(&self.tool);
        let tool_name = tool.name().to_string();
        let request = ToolRequest {
            config_file: config.tool_config_file_location.clone(),
            local_build: !config.production,
            compiler_folder: config.auxiliary_compiler_path.clone(),
        };
        debug!(tool = %tool_name, local_build = request.local_build, "Invoking tool");

        let build_folder = config.build_folder.clone();
        let blocking_logger = Arc::clone(&logger);
        let (counts, outcome) = tokio::task::spawn_blocking(move || {
            blocking_logger.write_line(format!(
                "Using {} version {}",
                tool.name(),
                tool.version()?
            ));

            let mut classifier =
                DiagnosticClassifier::new(tool.name(), build_folder, blocking_logger);
            let outcome = tool.invoke(&request, &mut |message: DiagnosticMessage| {
                classifier.visit(message)
            });
            let counts = classifier.finish()?;
            Ok::<_, BuildflowError>((counts, outcome?))
        })
        .await
        .map_err(|e| BuildflowError::Internal(format!("{tool_name} invocation panicked: {e}")))??;

        log_summary(&tool_name, counts, &logger);
        evaluate_outcome(&tool_name, outcome, config.production, &logger)?;

        Ok(RunnerResult::from_parts(counts, outcome))
    }
}
