//! The `clean` stage: resolves configured paths and offers each to the
//! `deletePath` hook.
//!
//! The stage never touches the filesystem itself. Plugins tapping
//! [`CleanStageHooks::delete_path`] do the deleting, and may veto or redirect
//! individual paths by bailing first.

use super::{HasLifecycleHooks, StageContext, StageDefinition, StageLifecycleHooks};
use crate::errors::{BuildflowError, Result};
use crate::executor::for_each_limited;
use crate::hooks::BailHook;
use crate::utils::resolve_path;
use async_trait::async_trait;
use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum number of `deletePath` invocations in flight.
pub const DELETE_CONCURRENCY: usize = 100;

const GLOB_METACHARACTERS: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '!'];

/// Caller-supplied options for the clean stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanStageOptions {
    /// Also delete the build tool's cache folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_cache: Option<bool>,
}

/// Resolved clean stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanStageProperties {
    /// Also delete the build tool's cache folder.
    pub delete_cache: bool,
    /// Literal paths or glob patterns, relative to the build folder.
    pub paths_to_delete: Vec<String>,
}

/// Extension points of the clean stage.
pub struct CleanStageHooks {
    lifecycle: StageLifecycleHooks,
    /// Offered every resolved absolute path, one invocation per path.
    pub delete_path: BailHook<PathBuf, ()>,
}

impl Default for CleanStageHooks {
    fn default() -> Self {
        Self {
            lifecycle: StageLifecycleHooks::default(),
            delete_path: BailHook::series_bail("deletePath"),
        }
    }
}

impl HasLifecycleHooks for CleanStageHooks {
    fn lifecycle(&self) -> &StageLifecycleHooks {
        &self.lifecycle
    }
}

impl fmt::Debug for CleanStageHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanStageHooks")
            .field("lifecycle", &self.lifecycle)
            .field("delete_path", &self.delete_path)
            .finish()
    }
}

/// The clean stage definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanStage;

#[async_trait]
impl StageDefinition for CleanStage {
    type Options = CleanStageOptions;
    type Properties = CleanStageProperties;
    type Hooks = CleanStageHooks;

    fn name(&self) -> &str {
        "clean"
    }

    fn default_properties(&self) -> serde_json::Value {
        serde_json::json!({ "deleteCache": false, "pathsToDelete": [] })
    }

    fn normalize(&self, mut properties: CleanStageProperties) -> Result<CleanStageProperties> {
        let mut seen = HashSet::new();
        properties
            .paths_to_delete
            .retain(|pattern| seen.insert(pattern.clone()));
        Ok(properties)
    }

    async fn execute(&self, ctx: &StageContext<'_, Self>) -> Result<()> {
        let properties = ctx.properties();
        let build = ctx.session().build();

        let patterns = properties.paths_to_delete.clone();
        let build_folder = build.build_folder.clone();
        let mut resolved = tokio::task::spawn_blocking(move || {
            let mut resolved = Vec::new();
            for pattern in &patterns {
                resolved.extend(resolve_pattern(pattern, &build_folder)?);
            }
            Ok::<_, BuildflowError>(resolved)
        })
        .await
        .map_err(|e| BuildflowError::Internal(format!("path resolution panicked: {e}")))??;

        if properties.delete_cache {
            resolved.push(build.build_cache_folder.clone());
        }
        debug!(count = resolved.len(), "Resolved paths to delete");

        let delete_path = &ctx.hooks().delete_path;
        for_each_limited(resolved, DELETE_CONCURRENCY, |path| async move {
            delete_path.invoke(&path).await.map(drop)
        })
        .await?;

        ctx.logger().write_line(format!(
            "Deleted {} paths",
            properties.paths_to_delete.len()
        ));
        Ok(())
    }
}

/// Returns true if `pattern` contains glob metacharacters.
#[must_use]
pub fn has_glob_magic(pattern: &str) -> bool {
    pattern.contains(GLOB_METACHARACTERS)
}

/// Resolves one configured entry against the build folder.
///
/// A literal path resolves to exactly one absolute path, whether or not it
/// exists. A glob pattern expands to every existing match beneath the build
/// folder, in the matcher's order. Brace alternatives are expanded first.
/// Wildcards never match a leading dot unless the pattern spells it out.
pub fn resolve_pattern(pattern: &str, build_folder: &Path) -> Result<Vec<PathBuf>> {
    if !has_glob_magic(pattern) {
        return Ok(vec![resolve_path(build_folder, Path::new(pattern))]);
    }
    if pattern.starts_with('!') || pattern.contains(['(', ')']) {
        return Err(BuildflowError::Glob {
            pattern: pattern.to_string(),
            reason: "negated and extended glob patterns are not supported".to_string(),
        });
    }

    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let escaped_root = glob::Pattern::escape(&build_folder.to_string_lossy());

    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for expanded in expand_braces(pattern) {
        let rooted = if Path::new(&expanded).is_absolute() {
            expanded
        } else {
            format!("{escaped_root}/{expanded}")
        };
        let entries = glob::glob_with(&rooted, options).map_err(|e| BuildflowError::Glob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| BuildflowError::Io(e.into_error()))?;
            let path = resolve_path(build_folder, &path);
            if seen.insert(path.clone()) {
                resolved.push(path);
            }
        }
    }
    Ok(resolved)
}

/// Expands `{a,b}` alternatives, nested ones included.
///
/// A brace group without a top-level comma is left as written.
fn expand_braces(pattern: &str) -> Vec<String> {
    let mut depth = 0usize;
    let mut open = None;
    for (i, c) in pattern.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                let Some(start) = open.filter(|_| depth == 0) else {
                    continue;
                };
                open = None;
                let alternatives = split_alternatives(&pattern[start + 1..i]);
                if alternatives.len() < 2 {
                    continue;
                }
                let (prefix, suffix) = (&pattern[..start], &pattern[i + 1..]);
                return alternatives
                    .into_iter()
                    .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
                    .collect();
            }
            _ => {}
        }
    }
    vec![pattern.to_string()]
}

fn split_alternatives(body: &str) -> Vec<&str> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut parts = Vec::new();
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfiguration;
    use crate::hooks::HookOutcome;
    use crate::logging::{CollectingLogSink, LogLevel, LoggingManager};
    use crate::session::BuildSession;
    use crate::stages::{Stage, StageState};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn session(root: &Path, sink: Arc<CollectingLogSink>) -> BuildSession {
        BuildSession::new(BuildConfiguration::with_root(root.to_path_buf()))
            .with_logging(Arc::new(LoggingManager::new(sink)))
    }

    fn write_clean_config(root: &Path, paths: &[&str]) {
        let folder = root.join(".buildflow");
        std::fs::create_dir_all(&folder).unwrap();
        let body = serde_json::json!({ "pathsToDelete": paths });
        std::fs::write(folder.join("clean.json"), body.to_string()).unwrap();
    }

    fn recording_stage() -> (Stage<CleanStage>, Arc<Mutex<Vec<PathBuf>>>) {
        let stage = Stage::new(CleanStage);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        stage.hooks().delete_path.tap_async("record", move |path: PathBuf| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().push(path);
                Ok(HookOutcome::Bail(()))
            }
        });
        (stage, seen)
    }

    #[test]
    fn test_glob_magic_detection() {
        assert!(has_glob_magic("lib/**/*.js"));
        assert!(has_glob_magic("temp?"));
        assert!(has_glob_magic("out/[ab]"));
        assert!(!has_glob_magic("lib"));
        assert!(!has_glob_magic("dist/types"));
    }

    #[test]
    fn test_literal_pattern_resolves_without_existence_check() {
        let resolved = resolve_pattern("does/not/exist", Path::new("/repo/project")).unwrap();
        assert_eq!(resolved, vec![PathBuf::from("/repo/project/does/not/exist")]);

        let resolved = resolve_pattern("../sibling", Path::new("/repo/project")).unwrap();
        assert_eq!(resolved, vec![PathBuf::from("/repo/sibling")]);
    }

    #[test]
    fn test_glob_pattern_expands_to_matches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::write(root.join("lib/a.js"), "").unwrap();
        std::fs::write(root.join("lib/b.js"), "").unwrap();
        std::fs::write(root.join("lib/c.d.ts"), "").unwrap();

        let resolved = resolve_pattern("lib/*.js", root).unwrap();

        assert_eq!(resolved, vec![root.join("lib/a.js"), root.join("lib/b.js")]);
        assert!(resolved.iter().all(|p| p.is_absolute()));
        assert!(resolve_pattern("nothing/*.js", root).unwrap().is_empty());
    }

    #[test]
    fn test_wildcards_skip_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join(".buildflow")).unwrap();
        std::fs::create_dir_all(root.join("lib/.cache")).unwrap();
        std::fs::write(root.join("lib/a.js"), "").unwrap();

        assert_eq!(resolve_pattern("*", root).unwrap(), vec![root.join("lib")]);
        assert_eq!(
            resolve_pattern("lib/**/*", root).unwrap(),
            vec![root.join("lib/a.js")]
        );
        assert_eq!(
            resolve_pattern(".git*", root).unwrap(),
            vec![root.join(".git")]
        );
    }

    #[test]
    fn test_brace_alternatives_expand() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for folder in ["dist", "lib", "src"] {
            std::fs::create_dir_all(root.join(folder)).unwrap();
        }

        let resolved = resolve_pattern("{dist,lib,missing}", root).unwrap();
        assert_eq!(resolved, vec![root.join("dist"), root.join("lib")]);

        let resolved = resolve_pattern("{lib,{dist,lib}}", root).unwrap();
        assert_eq!(resolved, vec![root.join("lib"), root.join("dist")]);
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("a/{b,c}/d"), vec!["a/b/d", "a/c/d"]);
        assert_eq!(expand_braces("{x,y}{1,2}"), vec!["x1", "x2", "y1", "y2"]);
        assert_eq!(expand_braces("{solo}/*.js"), vec!["{solo}/*.js"]);
        assert_eq!(expand_braces("lib/*.js"), vec!["lib/*.js"]);
    }

    #[test]
    fn test_extended_glob_is_rejected() {
        for pattern in ["!lib", "lib/@(a|b)", "+(x)"] {
            let err = resolve_pattern(pattern, Path::new("/repo")).unwrap_err();
            assert!(matches!(err, BuildflowError::Glob { .. }), "{pattern}");
        }
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let err = resolve_pattern("lib/***", Path::new("/repo")).unwrap_err();
        assert!(matches!(err, BuildflowError::Glob { .. }));
    }

    #[tokio::test]
    async fn test_paths_flow_through_delete_hook() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("temp")).unwrap();
        std::fs::write(root.join("temp/x.log"), "").unwrap();
        write_clean_config(root, &["lib", "temp/*.log", "lib"]);

        let sink = Arc::new(CollectingLogSink::new());
        let (stage, seen) = recording_stage();

        stage
            .run(&session(root, sink.clone()), &CleanStageOptions::default())
            .await
            .unwrap();

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![root.join("lib"), root.join("temp/x.log")]);
        assert!(sink.contains(LogLevel::Info, "Deleted 2 paths"));
        assert_eq!(stage.state(), StageState::Succeeded);
    }

    #[tokio::test]
    async fn test_cache_folder_only_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_clean_config(root, &["lib"]);
        let cache = root.join(".buildflow/build-cache");

        let (without, seen_without) = recording_stage();
        without
            .run(
                &session(root, Arc::new(CollectingLogSink::new())),
                &CleanStageOptions::default(),
            )
            .await
            .unwrap();
        assert!(!seen_without.lock().contains(&cache));

        let (with, seen_with) = recording_stage();
        with.run(
            &session(root, Arc::new(CollectingLogSink::new())),
            &CleanStageOptions {
                delete_cache: Some(true),
            },
        )
        .await
        .unwrap();
        let seen_with = seen_with.lock().clone();
        assert_eq!(seen_with.iter().filter(|p| **p == cache).count(), 1);
    }

    #[tokio::test]
    async fn test_missing_config_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingLogSink::new());
        let (stage, seen) = recording_stage();

        stage
            .run(&session(dir.path(), sink.clone()), &CleanStageOptions::default())
            .await
            .unwrap();

        assert!(seen.lock().is_empty());
        assert!(sink.contains(LogLevel::Info, "Deleted 0 paths"));
        assert_eq!(
            stage.properties().unwrap(),
            &CleanStageProperties {
                delete_cache: false,
                paths_to_delete: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_handler_failure_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        write_clean_config(dir.path(), &["a", "b"]);
        let sink = Arc::new(CollectingLogSink::new());
        let stage = Stage::new(CleanStage);
        stage
            .hooks()
            .delete_path
            .tap_async("refuse", |path: PathBuf| async move {
                Err::<HookOutcome<()>, _>(anyhow::anyhow!("refusing {}", path.display()))
            });

        let err = stage
            .run(&session(dir.path(), sink.clone()), &CleanStageOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildflowError::HookHandler { .. }));
        assert_eq!(stage.state(), StageState::Failed);
        assert!(!sink.contains(LogLevel::Info, "Deleted"));
    }
}
