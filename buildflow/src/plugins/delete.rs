//! Deletes the paths offered by the clean stage.

use crate::hooks::{HookHandler, HookOutcome};
use crate::stages::{CleanStageHooks, StagePlugin};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Removes files and directory trees from disk.
///
/// A path that no longer exists counts as deleted. Every path it sees is
/// claimed, so taps after it never run.
#[derive(Debug, Default)]
pub struct FileSystemDeletePlugin {
    handler: Arc<DeleteHandler>,
}

#[derive(Debug, Default)]
struct DeleteHandler {
    deleted: AtomicUsize,
}

impl FileSystemDeletePlugin {
    /// Creates the plugin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many paths actually existed and were removed.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.handler.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HookHandler<PathBuf, ()> for DeleteHandler {
    async fn call(&self, path: &PathBuf) -> anyhow::Result<HookOutcome<()>> {
        let removed = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };

        match removed {
            Ok(()) => {
                self.deleted.fetch_add(1, Ordering::SeqCst);
                debug!(path = %path.display(), "Deleted");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Already absent");
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to delete {}", path.display())))
            }
        }
        Ok(HookOutcome::Bail(()))
    }
}

impl StagePlugin<CleanStageHooks> for FileSystemDeletePlugin {
    fn name(&self) -> &str {
        "FileSystemDeletePlugin"
    }

    fn apply(&self, hooks: &CleanStageHooks) {
        hooks
            .delete_path
            .tap(self.name(), self.handler.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BailHook;

    #[tokio::test]
    async fn test_deletes_files_and_trees() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let tree = dir.path().join("lib");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("nested/b.js"), "y").unwrap();

        let plugin = FileSystemDeletePlugin::new();
        let hooks = CleanStageHooks::default();
        plugin.apply(&hooks);

        assert_eq!(hooks.delete_path.invoke(&file).await.unwrap(), Some(()));
        assert_eq!(hooks.delete_path.invoke(&tree).await.unwrap(), Some(()));

        assert!(!file.exists());
        assert!(!tree.exists());
        assert_eq!(plugin.deleted_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_path_is_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let hook: BailHook<PathBuf, ()> = BailHook::series_bail("deletePath");
        let plugin = FileSystemDeletePlugin::new();
        hook.tap("delete", plugin.handler.clone());

        let outcome = hook.invoke(&dir.path().join("gone")).await.unwrap();

        assert_eq!(outcome, Some(()));
        assert_eq!(plugin.deleted_count(), 0);
    }
}
