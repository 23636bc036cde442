//! A [`DiagnosticTool`] backed by an external executable.
//!
//! The executable speaks a line protocol on stdout: every line is a JSON
//! diagnostic, except a final `{"result": {...}}` line carrying the outcome.
//! Lines that are not JSON are passed through as info text.

use super::diagnostics::{DiagnosticMessage, DiagnosticSeverity};
use super::tool::{DiagnosticTool, DiagnosticVisitor, ToolLoader, ToolOutcome, ToolRequest};
use crate::errors::{BuildflowError, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

/// One parsed line of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLine {
    /// A diagnostic to classify.
    Diagnostic(DiagnosticMessage),
    /// The final outcome.
    Outcome(ToolOutcome),
    /// Plain text.
    Text(String),
    /// Nothing but whitespace.
    Blank,
}

#[derive(Deserialize)]
struct OutcomeLine {
    result: ToolOutcome,
}

/// Parses one line of tool stdout.
#[must_use]
pub fn parse_tool_line(line: &str) -> ToolLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ToolLine::Blank;
    }
    if !trimmed.starts_with('{') {
        return ToolLine::Text(trimmed.to_string());
    }
    if let Ok(OutcomeLine { result }) = serde_json::from_str::<OutcomeLine>(trimmed) {
        return ToolLine::Outcome(result);
    }
    match serde_json::from_str::<DiagnosticMessage>(trimmed) {
        Ok(message) => ToolLine::Diagnostic(message),
        Err(_) => ToolLine::Text(trimmed.to_string()),
    }
}

/// Runs `<program> [leading args] run --config <file> [--local] [--compiler-folder <dir>]`.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    program: PathBuf,
    leading_args: Vec<OsString>,
    display_name: String,
    working_dir: Option<PathBuf>,
}

impl ProcessTool {
    /// Creates a tool for `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            display_name: display_name.into(),
            working_dir: None,
        }
    }

    /// Arguments placed before the subcommand, e.g. a script for an interpreter.
    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Runs the tool from `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(&self, err: &std::io::Error) -> BuildflowError {
        BuildflowError::Internal(format!(
            "could not start {} ({}): {err}",
            self.display_name,
            self.program.display()
        ))
    }
}

impl DiagnosticTool for ProcessTool {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn version(&self) -> Result<String> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(&e))?;
        if !output.status.success() {
            return Err(BuildflowError::tool_invocation(&self.display_name));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn invoke(
        &self,
        request: &ToolRequest,
        visitor: &mut DiagnosticVisitor<'_>,
    ) -> Result<ToolOutcome> {
        let mut command = self.command();
        command.arg("run").arg("--config").arg(&request.config_file);
        if request.local_build {
            command.arg("--local");
        }
        if let Some(folder) = &request.compiler_folder {
            command.arg("--compiler-folder").arg(folder);
        }
        debug!(tool = %self.display_name, ?command, "Spawning tool");

        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildflowError::Internal("tool stdout was not captured".into()))?;

        let streamed = stream_lines(BufReader::new(stdout), visitor);
        if streamed.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let outcome = streamed?;

        match outcome {
            Some(outcome) if status.success() => Ok(outcome),
            Some(outcome) => {
                warn!(tool = %self.display_name, %status, "Tool exited unsuccessfully");
                Ok(ToolOutcome {
                    succeeded: false,
                    ..outcome
                })
            }
            None => {
                warn!(tool = %self.display_name, %status, "Tool produced no result line");
                Ok(ToolOutcome::default())
            }
        }
    }
}

/// Feeds every stdout line to `visitor` and returns the outcome line, if any.
///
/// Bytes that are not UTF-8 are replaced, so a stray encoding never aborts
/// the run.
fn stream_lines(
    mut reader: impl BufRead,
    visitor: &mut DiagnosticVisitor<'_>,
) -> Result<Option<ToolOutcome>> {
    let mut outcome = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(outcome);
        }
        match parse_tool_line(&String::from_utf8_lossy(&buf)) {
            ToolLine::Diagnostic(message) => {
                visitor(message)?;
            }
            ToolLine::Text(text) => {
                visitor(DiagnosticMessage::new(DiagnosticSeverity::Info, text))?;
            }
            ToolLine::Outcome(result) => outcome = Some(result),
            ToolLine::Blank => {}
        }
    }
}

/// Loads a [`ProcessTool`] for the executable inside a tool package.
#[derive(Debug, Clone)]
pub struct ProcessToolLoader {
    executable: PathBuf,
    display_name: String,
}

impl ProcessToolLoader {
    /// `executable` is resolved against the package path at load time.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            display_name: display_name.into(),
        }
    }
}

impl ToolLoader for ProcessToolLoader {
    fn load(&self, package_path: &Path) -> Result<Arc<dyn DiagnosticTool>> {
        let program = package_path.join(&self.executable);
        if !program.exists() {
            return Err(BuildflowError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found at {}", self.display_name, program.display()),
            )));
        }
        Ok(Arc::new(ProcessTool::new(program, self.display_name.clone())))
    }
}
