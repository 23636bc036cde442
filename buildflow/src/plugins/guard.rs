//! Keeps the clean stage inside the build folder.

use crate::hooks::{HookHandler, HookOutcome};
use crate::logging::ScopedLogger;
use crate::stages::{CleanStageHooks, StagePlugin};
use crate::utils::{is_under_or_equal, normalize};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Vetoes deletion of anything outside the build folder, and of the build
/// folder itself.
///
/// A vetoed path is claimed with a warning so later taps never see it.
/// Paths inside the folder pass through untouched. With a scoped logger
/// attached, each veto is also recorded as one of that logger's warnings.
#[derive(Debug)]
pub struct BuildFolderGuardPlugin {
    handler: Arc<GuardHandler>,
}

#[derive(Debug)]
struct GuardHandler {
    build_folder: PathBuf,
    vetoed: Mutex<Vec<PathBuf>>,
    logger: Option<Arc<ScopedLogger>>,
}

impl BuildFolderGuardPlugin {
    /// Guards `build_folder`.
    #[must_use]
    pub fn new(build_folder: impl AsRef<Path>) -> Self {
        Self::build(build_folder.as_ref(), None)
    }

    /// Guards `build_folder` and reports vetoes through `logger`.
    #[must_use]
    pub fn with_logger(build_folder: impl AsRef<Path>, logger: Arc<ScopedLogger>) -> Self {
        Self::build(build_folder.as_ref(), Some(logger))
    }

    fn build(build_folder: &Path, logger: Option<Arc<ScopedLogger>>) -> Self {
        Self {
            handler: Arc::new(GuardHandler {
                build_folder: normalize(build_folder),
                vetoed: Mutex::new(Vec::new()),
                logger,
            }),
        }
    }

    /// Returns the paths vetoed so far.
    #[must_use]
    pub fn vetoed(&self) -> Vec<PathBuf> {
        self.handler.vetoed.lock().clone()
    }
}

impl GuardHandler {
    fn allows(&self, path: &Path) -> bool {
        let path = normalize(path);
        path != self.build_folder && is_under_or_equal(&path, &self.build_folder)
    }
}

#[async_trait]
impl HookHandler<PathBuf, ()> for GuardHandler {
    async fn call(&self, path: &PathBuf) -> anyhow::Result<HookOutcome<()>> {
        if self.allows(path) {
            return Ok(HookOutcome::Continue);
        }
        warn!(
            path = %path.display(),
            build_folder = %self.build_folder.display(),
            "Refusing to delete path outside the build folder"
        );
        if let Some(logger) = &self.logger {
            logger.emit_warning(format!(
                "Refusing to delete {}: it is not inside {}",
                path.display(),
                self.build_folder.display()
            ));
        }
        self.vetoed.lock().push(path.clone());
        Ok(HookOutcome::Bail(()))
    }
}

impl StagePlugin<CleanStageHooks> for BuildFolderGuardPlugin {
    fn name(&self) -> &str {
        "BuildFolderGuardPlugin"
    }

    fn apply(&self, hooks: &CleanStageHooks) {
        hooks
            .delete_path
            .tap(self.name(), self.handler.clone());
    }
}
