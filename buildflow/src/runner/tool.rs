//! The seam between a runner and the external tool it wraps.

use super::diagnostics::{DiagnosticMessage, Handled};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Visitor handed to a tool; called once per diagnostic, in emission order.
pub type DiagnosticVisitor<'a> = dyn FnMut(DiagnosticMessage) -> Result<Handled> + 'a;

/// Parameters of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// The tool's own configuration file.
    pub config_file: PathBuf,
    /// Update checked-in baselines instead of comparing against them.
    pub local_build: bool,
    /// Alternative compiler installation for the tool to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_folder: Option<PathBuf>,
}

/// What the tool reported once it finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    /// The tool completed without errors.
    pub succeeded: bool,
    /// A generated report differs from its baseline.
    #[serde(default)]
    pub report_changed: bool,
}

/// An external analysis tool that streams diagnostics.
///
/// Implementations are synchronous and are always called on a blocking
/// thread. Every diagnostic goes through the visitor; if the visitor returns
/// an error the tool should stop and propagate it.
pub trait DiagnosticTool: Send + Sync {
    /// Display name used in log lines and errors.
    fn name(&self) -> &str;

    /// Version string for the banner.
    fn version(&self) -> Result<String>;

    /// Runs the tool once.
    fn invoke(
        &self,
        request: &ToolRequest,
        visitor: &mut DiagnosticVisitor<'_>,
    ) -> Result<ToolOutcome>;
}

/// Locates a tool given the package path a stage was configured with.
pub trait ToolLoader: Send + Sync {
    /// Loads the tool installed at `package_path`.
    fn load(&self, package_path: &Path) -> Result<Arc<dyn DiagnosticTool>>;
}

/// Loader that always returns the same tool, ignoring the package path.
#[derive(Clone)]
pub struct StaticToolLoader {
    tool: Arc<dyn DiagnosticTool>,
}

impl StaticToolLoader {
    /// Wraps an already constructed tool.
    #[must_use]
    pub fn new(tool: Arc<dyn DiagnosticTool>) -> Self {
        Self { tool }
    }
}

impl ToolLoader for StaticToolLoader {
    fn load(&self, _package_path: &Path) -> Result<Arc<dyn DiagnosticTool>> {
        Ok(self.tool.clone())
    }
}

impl fmt::Debug for StaticToolLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToolLoader")
            .field("tool", &self.tool.name())
            .finish()
    }
}
