//! Isolated invocations of external tools.
//!
//! A [`Runner`] wraps one tool call: it takes a typed configuration and a
//! scoped logger, folds the tool's diagnostics through a
//! [`DiagnosticClassifier`], and maps the tool's outcome onto pass/fail.

mod api_extractor;
mod diagnostics;
mod process;
mod tool;

pub use api_extractor::{ApiExtractorRunner, ApiExtractorRunnerConfiguration};
pub use diagnostics::{
    format_diagnostic, summary_line, DiagnosticClassifier, DiagnosticCounts, DiagnosticMessage,
    DiagnosticSeverity, Handled,
};
pub use process::{parse_tool_line, ProcessTool, ProcessToolLoader, ToolLine};
pub use tool::{
    DiagnosticTool, DiagnosticVisitor, StaticToolLoader, ToolLoader, ToolOutcome, ToolRequest,
};

use crate::errors::{BuildflowError, Result};
use crate::logging::{LogLevel, LoggingManager, ScopedLogger};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// Aggregate outcome of one runner invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerResult {
    /// Diagnostics routed to the error channel.
    pub error_count: usize,
    /// Diagnostics routed to the warning channel.
    pub warning_count: usize,
    /// The tool reported success.
    pub succeeded: bool,
    /// A generated report differs from its baseline.
    pub report_changed: bool,
}

impl RunnerResult {
    /// Combines classifier counts with the tool's outcome.
    #[must_use]
    pub fn from_parts(counts: DiagnosticCounts, outcome: ToolOutcome) -> Self {
        Self {
            error_count: counts.errors,
            warning_count: counts.warnings,
            succeeded: outcome.succeeded,
            report_changed: outcome.report_changed,
        }
    }
}

/// One kind of isolated tool invocation.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Immutable configuration for one invocation.
    type Config: Send + Sync;

    /// Name of the scoped logger the runner writes to.
    fn name(&self) -> &str;

    /// Invokes the tool. Fails when the outcome is fatal.
    async fn invoke(&self, config: &Self::Config, logger: Arc<ScopedLogger>)
        -> Result<RunnerResult>;
}

/// Runs `runner` with the scoped logger named after it.
pub async fn run_runner<R: Runner>(
    runner: &R,
    config: &R::Config,
    logging: &LoggingManager,
) -> Result<RunnerResult> {
    let logger = logging.request_scoped_logger(runner.name());
    let span = info_span!("runner", runner = %runner.name());
    runner.invoke(config, logger).instrument(span).await
}

/// Writes the completion summary for `counts`, if there is one.
pub fn log_summary(tool: &str, counts: DiagnosticCounts, logger: &ScopedLogger) {
    match summary_line(tool, counts) {
        Some((LogLevel::Error, line)) => logger.write_error_line(line),
        Some((_, line)) => logger.write_warning_line(line),
        None => {}
    }
}

/// Maps a tool outcome onto pass/fail.
///
/// An unsuccessful run is [`BuildflowError::ToolInvocation`]. A changed
/// report is [`BuildflowError::ReportDrift`] in production and a warning
/// otherwise.
pub fn evaluate_outcome(
    tool: &str,
    outcome: ToolOutcome,
    production: bool,
    logger: &ScopedLogger,
) -> Result<()> {
    if !outcome.succeeded {
        return Err(BuildflowError::tool_invocation(tool));
    }
    if outcome.report_changed {
        if production {
            return Err(BuildflowError::report_drift(tool));
        }
        logger.write_warning_line(format!(
            "{tool} report changed. Commit the updated report to accept the change."
        ));
    }
    Ok(())
}
