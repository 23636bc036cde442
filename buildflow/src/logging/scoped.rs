//! Scoped loggers and the manager that hands them out.

use super::{LogLevel, LogRecord, LogSink, TracingLogSink};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named diagnostic channel for one stage or runner.
///
/// Errors and warnings emitted through [`ScopedLogger::emit_error`] and
/// [`ScopedLogger::emit_warning`] are also recorded so the pipeline can
/// decide on pass/fail afterwards.
pub struct ScopedLogger {
    name: String,
    sink: Arc<dyn LogSink>,
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl ScopedLogger {
    /// Creates a logger that writes to `sink`.
    #[must_use]
    pub fn new(name: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: name.into(),
            sink,
            errors: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Returns the logger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.emit(LogRecord::new(&self.name, level, message));
    }

    /// Records and emits an error.
    pub fn emit_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.errors.lock().push(message.clone());
        self.write(LogLevel::Error, message);
    }

    /// Records and emits a warning.
    pub fn emit_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.warnings.lock().push(message.clone());
        self.write(LogLevel::Warning, message);
    }

    /// Writes a normal line.
    pub fn write_line(&self, message: impl Into<String>) {
        self.write(LogLevel::Info, message);
    }

    /// Writes a low-priority line.
    pub fn write_verbose_line(&self, message: impl Into<String>) {
        self.write(LogLevel::Verbose, message);
    }

    /// Writes a line to the error channel without recording it.
    pub fn write_error_line(&self, message: impl Into<String>) {
        self.write(LogLevel::Error, message);
    }

    /// Writes a line to the warning channel without recording it.
    pub fn write_warning_line(&self, message: impl Into<String>) {
        self.write(LogLevel::Warning, message);
    }

    /// Returns the recorded errors.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Returns the recorded warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Returns true if an error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }
}

impl fmt::Debug for ScopedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedLogger")
            .field("name", &self.name)
            .field("errors", &self.errors.lock().len())
            .field("warnings", &self.warnings.lock().len())
            .finish()
    }
}

/// Hands out one [`ScopedLogger`] per name, all sharing a sink.
pub struct LoggingManager {
    sink: Arc<dyn LogSink>,
    loggers: RwLock<HashMap<String, Arc<ScopedLogger>>>,
}

impl LoggingManager {
    /// Creates a manager delivering to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            loggers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the logger for `name`, creating it on first request.
    pub fn request_scoped_logger(&self, name: &str) -> Arc<ScopedLogger> {
        if let Some(logger) = self.loggers.read().get(name) {
            return Arc::clone(logger);
        }

        let mut loggers = self.loggers.write();
        Arc::clone(
            loggers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ScopedLogger::new(name, Arc::clone(&self.sink)))),
        )
    }

    /// Returns the names of all requested loggers, sorted.
    #[must_use]
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if any logger recorded an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.loggers.read().values().any(|l| l.has_errors())
    }

    /// Returns `(logger, error)` pairs for every recorded error.
    #[must_use]
    pub fn all_errors(&self) -> Vec<(String, String)> {
        let loggers = self.loggers.read();
        let mut names: Vec<&String> = loggers.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| {
                loggers[name]
                    .errors()
                    .into_iter()
                    .map(move |e| (name.clone(), e))
            })
            .collect()
    }
}

impl Default for LoggingManager {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogSink))
    }
}

impl fmt::Debug for LoggingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingManager")
            .field("loggers", &self.logger_names())
            .finish()
    }
}
