//! Log sinks: where scoped loggers deliver their records.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Priority of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error channel.
    Error,
    /// Warning channel.
    Warning,
    /// Normal output.
    Info,
    /// Low-priority output.
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// One line emitted by a scoped logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Name of the emitting logger.
    pub logger: String,
    /// Priority.
    pub level: LogLevel,
    /// The line, without trailing newline.
    pub message: String,
}

impl LogRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(logger: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            level,
            message: message.into(),
        }
    }
}

/// Destination for log records.
///
/// Each call to [`LogSink::emit`] delivers one whole record; concurrent
/// emitters never interleave within a record.
pub trait LogSink: Send + Sync {
    /// Delivers a record.
    fn emit(&self, record: LogRecord);
}

/// A sink that forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, record: LogRecord) {
        let LogRecord {
            logger,
            level,
            message,
        } = record;
        match level {
            LogLevel::Error => error!(logger = %logger, "{}", message),
            LogLevel::Warning => warn!(logger = %logger, "{}", message),
            LogLevel::Info => info!(logger = %logger, "{}", message),
            LogLevel::Verbose => debug!(logger = %logger, "{}", message),
        }
    }
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingLogSink {
    records: RwLock<Vec<LogRecord>>,
}

impl CollectingLogSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }

    /// Returns the messages emitted at the given level.
    #[must_use]
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records
            .read()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    /// Returns true if any record at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .read()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl LogSink for CollectingLogSink {
    fn emit(&self, record: LogRecord) {
        self.records.write().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_sink_accepts_all_levels() {
        let sink = TracingLogSink;
        for level in [
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Info,
            LogLevel::Verbose,
        ] {
            sink.emit(LogRecord::new("test", level, "line"));
        }
    }

    #[test]
    fn test_collecting_sink_filters_by_level() {
        let sink = CollectingLogSink::new();
        sink.emit(LogRecord::new("clean", LogLevel::Info, "Deleted 2 paths"));
        sink.emit(LogRecord::new("clean", LogLevel::Error, "boom"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.messages_at(LogLevel::Error), vec!["boom"]);
        assert!(sink.contains(LogLevel::Info, "2 paths"));
        assert!(!sink.contains(LogLevel::Warning, "2 paths"));

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_log_level_serialize() {
        let json = serde_json::to_string(&LogLevel::Verbose).unwrap();
        assert_eq!(json, r#""verbose""#);
    }
}
