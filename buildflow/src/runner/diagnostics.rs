//! Diagnostic messages and their classification into log channels.

use crate::errors::{BuildflowError, Result};
use crate::logging::{LogLevel, ScopedLogger};
use crate::utils::relative_to;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Severity attached to a tool diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiagnosticSeverity {
    /// Goes to the error channel and is counted.
    Error,
    /// Goes to the warning channel and is counted.
    Warning,
    /// Low-priority text.
    Verbose,
    /// Normal text.
    Info,
    /// Suppressed; produces no output.
    None,
    /// A value outside the known set.
    Unrecognized(String),
}

impl From<String> for DiagnosticSeverity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warning" => Self::Warning,
            "verbose" => Self::Verbose,
            "info" => Self::Info,
            "none" | "suppressed" => Self::None,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<DiagnosticSeverity> for String {
    fn from(value: DiagnosticSeverity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Verbose => write!(f, "verbose"),
            Self::Info => write!(f, "info"),
            Self::None => write!(f, "none"),
            Self::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

/// One message produced by a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticMessage {
    /// Severity.
    pub log_level: DiagnosticSeverity,
    /// Message text.
    pub text: String,
    /// Absolute path of the offending source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_path: Option<PathBuf>,
    /// 1-based line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_line: Option<u32>,
    /// 1-based column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_column: Option<u32>,
    /// Tool-specific message identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl DiagnosticMessage {
    /// Creates a message without a source location.
    #[must_use]
    pub fn new(log_level: DiagnosticSeverity, text: impl Into<String>) -> Self {
        Self {
            log_level,
            text: text.into(),
            source_file_path: None,
            source_file_line: None,
            source_file_column: None,
            category: None,
        }
    }

    /// Sets the source location.
    #[must_use]
    pub fn at(mut self, path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        self.source_file_path = Some(path.into());
        self.source_file_line = Some(line);
        self.source_file_column = Some(column);
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Returned by the classifier once a message needs no further handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handled;

/// Error and warning totals of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    /// Messages routed to the error channel.
    pub errors: usize,
    /// Messages routed to the warning channel.
    pub warnings: usize,
}

/// Formats an error or warning for the log.
///
/// With a source path: `path:line:col - (category) text`, where `path` is
/// relative to `build_folder` when the file is inside it and absolute
/// otherwise. Missing line, column or category are left out. Without a
/// source path the text is returned as-is.
#[must_use]
pub fn format_diagnostic(message: &DiagnosticMessage, build_folder: &Path) -> String {
    let Some(source) = &message.source_file_path else {
        return message.text.clone();
    };

    let shown = relative_to(source, build_folder).unwrap_or_else(|| source.clone());
    let mut location = shown.display().to_string();
    if let Some(line) = message.source_file_line {
        location.push_str(&format!(":{line}"));
        if let Some(column) = message.source_file_column {
            location.push_str(&format!(":{column}"));
        }
    }

    match &message.category {
        Some(category) => format!("{location} - ({category}) {}", message.text),
        None => format!("{location} - {}", message.text),
    }
}

/// Routes tool diagnostics to a scoped logger and counts them.
pub struct DiagnosticClassifier {
    tool: String,
    build_folder: PathBuf,
    logger: Arc<ScopedLogger>,
    counts: DiagnosticCounts,
    unexpected: Option<String>,
}

impl DiagnosticClassifier {
    /// Creates a classifier for one invocation of `tool`.
    #[must_use]
    pub fn new(tool: impl Into<String>, build_folder: PathBuf, logger: Arc<ScopedLogger>) -> Self {
        Self {
            tool: tool.into(),
            build_folder,
            logger,
            counts: DiagnosticCounts::default(),
            unexpected: None,
        }
    }

    /// Classifies and logs one message.
    ///
    /// An unrecognised severity is logged as an error and returned as
    /// [`BuildflowError::UnexpectedDiagnosticSeverity`]; the invocation is
    /// fatal even if the tool ignores the error.
    pub fn visit(&mut self, message: DiagnosticMessage) -> Result<Handled> {
        match &message.log_level {
            DiagnosticSeverity::Error => {
                self.counts.errors += 1;
                self.logger
                    .emit_error(format_diagnostic(&message, &self.build_folder));
            }
            DiagnosticSeverity::Warning => {
                self.counts.warnings += 1;
                self.logger
                    .emit_warning(format_diagnostic(&message, &self.build_folder));
            }
            DiagnosticSeverity::Verbose => self.logger.write_verbose_line(message.text),
            DiagnosticSeverity::Info => self.logger.write_line(message.text),
            DiagnosticSeverity::None => {}
            DiagnosticSeverity::Unrecognized(level) => {
                let err = BuildflowError::unexpected_severity(&self.tool, level);
                self.logger.emit_error(err.to_string());
                self.unexpected.get_or_insert_with(|| level.clone());
                return Err(err);
            }
        }
        Ok(Handled)
    }

    /// Returns the counts so far.
    #[must_use]
    pub fn counts(&self) -> DiagnosticCounts {
        self.counts
    }

    /// Ends the invocation, failing if an unrecognised severity was seen.
    pub fn finish(self) -> Result<DiagnosticCounts> {
        match self.unexpected {
            Some(level) => Err(BuildflowError::unexpected_severity(self.tool, level)),
            None => Ok(self.counts),
        }
    }
}

impl fmt::Debug for DiagnosticClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticClassifier")
            .field("tool", &self.tool)
            .field("counts", &self.counts)
            .finish()
    }
}

/// Builds the one-line completion summary, if any.
///
/// Errors take precedence over warnings; nothing is reported when both are
/// zero.
#[must_use]
pub fn summary_line(tool: &str, counts: DiagnosticCounts) -> Option<(LogLevel, String)> {
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    if counts.errors > 0 {
        Some((
            LogLevel::Error,
            format!(
                "{tool} completed with {} error{}",
                counts.errors,
                plural(counts.errors)
            ),
        ))
    } else if counts.warnings > 0 {
        Some((
            LogLevel::Warning,
            format!(
                "{tool} completed with {} warning{}",
                counts.warnings,
                plural(counts.warnings)
            ),
        ))
    } else {
        None
    }
}
