//! Error types for the buildflow framework.
//!
//! Every fallible operation in the crate returns [`BuildflowError`]. The
//! variants follow the pipeline's failure taxonomy: a missing stage
//! configuration file is never surfaced (loaders return `Ok(None)`), all
//! other conditions propagate to the pipeline driver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = BuildflowError> = std::result::Result<T, E>;

/// The main error type for buildflow operations.
#[derive(Debug, Error)]
pub enum BuildflowError {
    /// A configuration file exists but could not be read or parsed.
    #[error("Invalid configuration file {}: {reason}", path.display())]
    ConfigurationInvalid {
        /// The offending file.
        path: PathBuf,
        /// Why the file was rejected.
        reason: String,
    },

    /// A subscribed hook handler failed.
    #[error("Hook '{hook}' handler '{handler}' failed: {source}")]
    HookHandler {
        /// The hook being invoked.
        hook: String,
        /// The tap name of the failing handler.
        handler: String,
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },

    /// The wrapped tool reported an unsuccessful run.
    #[error("{tool} failed.")]
    ToolInvocation {
        /// Display name of the tool.
        tool: String,
    },

    /// A generated report differs from its checked-in baseline in production mode.
    #[error("{tool} report changed.")]
    ReportDrift {
        /// Display name of the tool.
        tool: String,
    },

    /// The wrapped tool emitted a severity outside the known set.
    #[error("Unexpected {tool} log level: {level}")]
    UnexpectedDiagnosticSeverity {
        /// Display name of the tool.
        tool: String,
        /// The raw severity value.
        level: String,
    },

    /// A path pattern could not be compiled as a glob.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Glob {
        /// The pattern as configured.
        pattern: String,
        /// The parser's message.
        reason: String,
    },

    /// A stage body failed for a stage-specific reason.
    #[error("Stage '{stage}' failed: {message}")]
    StageExecution {
        /// The stage name.
        stage: String,
        /// The failure message.
        message: String,
    },

    /// Two stages with the same name were added to one pipeline.
    #[error("Stage '{stage}' is already part of the pipeline")]
    DuplicateStage {
        /// The repeated stage name.
        stage: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildflowError {
    /// Creates a configuration-invalid error.
    #[must_use]
    pub fn configuration_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a hook handler error.
    #[must_use]
    pub fn hook_handler(
        hook: impl Into<String>,
        handler: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::HookHandler {
            hook: hook.into(),
            handler: handler.into(),
            source,
        }
    }

    /// Creates a tool invocation error.
    #[must_use]
    pub fn tool_invocation(tool: impl Into<String>) -> Self {
        Self::ToolInvocation { tool: tool.into() }
    }

    /// Creates a report drift error.
    #[must_use]
    pub fn report_drift(tool: impl Into<String>) -> Self {
        Self::ReportDrift { tool: tool.into() }
    }

    /// Creates an unexpected-severity error.
    #[must_use]
    pub fn unexpected_severity(tool: impl Into<String>, level: impl Into<String>) -> Self {
        Self::UnexpectedDiagnosticSeverity {
            tool: tool.into(),
            level: level.into(),
        }
    }

    /// Creates a stage execution error.
    #[must_use]
    pub fn stage_execution(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true for an IO error caused by a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Returns the stable kind name used in reports.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationInvalid { .. } => ErrorKind::ConfigurationInvalid,
            Self::HookHandler { .. } => ErrorKind::HookHandlerFailure,
            Self::ToolInvocation { .. } => ErrorKind::ToolInvocationFailure,
            Self::ReportDrift { .. } => ErrorKind::ReportDrift,
            Self::UnexpectedDiagnosticSeverity { .. } => ErrorKind::UnexpectedDiagnosticSeverity,
            Self::Io(_) => ErrorKind::Filesystem,
            Self::Glob { .. }
            | Self::StageExecution { .. }
            | Self::DuplicateStage { .. }
            | Self::Internal(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::HookHandler { hook, handler, .. } => {
                map.insert("hook".to_string(), serde_json::json!(hook));
                map.insert("handler".to_string(), serde_json::json!(handler));
            }
            Self::ToolInvocation { tool }
            | Self::ReportDrift { tool }
            | Self::UnexpectedDiagnosticSeverity { tool, .. } => {
                map.insert("tool".to_string(), serde_json::json!(tool));
            }
            Self::ConfigurationInvalid { path, .. } => {
                map.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        map
    }
}

impl From<serde_json::Error> for BuildflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Coarse classification of a [`BuildflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration file present but invalid.
    ConfigurationInvalid,
    /// A hook handler failed.
    HookHandlerFailure,
    /// The wrapped tool failed.
    ToolInvocationFailure,
    /// Generated report drifted from its baseline.
    ReportDrift,
    /// Unknown diagnostic severity.
    UnexpectedDiagnosticSeverity,
    /// Filesystem error other than a tolerated non-existence.
    Filesystem,
    /// Anything else.
    Internal,
}
