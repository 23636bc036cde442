//! Lexical path helpers.
//!
//! None of these touch the filesystem: paths are resolved and compared by
//! their components only.

use std::path::{Component, Path, PathBuf};

/// Joins `path` onto `base` and normalises `.` and `..` components.
///
/// An absolute `path` replaces `base` entirely. `..` never climbs above the
/// root.
#[must_use]
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    normalize(&base.join(path))
}

/// Removes `.` components and folds `..` into their parent.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns true if `child` is `parent` or lies beneath it.
#[must_use]
pub fn is_under_or_equal(child: &Path, parent: &Path) -> bool {
    normalize(child).starts_with(normalize(parent))
}

/// Returns `child` relative to `parent`, or `None` if it is not beneath it.
///
/// `child == parent` yields an empty path.
#[must_use]
pub fn relative_to(child: &Path, parent: &Path) -> Option<PathBuf> {
    normalize(child)
        .strip_prefix(normalize(parent))
        .ok()
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_path(Path::new("/repo/project"), Path::new("lib")),
            PathBuf::from("/repo/project/lib")
        );
        assert_eq!(
            resolve_path(Path::new("/repo/project"), Path::new("./temp/../dist/")),
            PathBuf::from("/repo/project/dist")
        );
    }

    #[test]
    fn test_resolve_escapes_and_absolute() {
        assert_eq!(
            resolve_path(Path::new("/repo/project"), Path::new("../other")),
            PathBuf::from("/repo/other")
        );
        assert_eq!(
            resolve_path(Path::new("/repo/project"), Path::new("/tmp/x")),
            PathBuf::from("/tmp/x")
        );
        assert_eq!(
            resolve_path(Path::new("/"), Path::new("../../x")),
            PathBuf::from("/x")
        );
    }

    #[test]
    fn test_under_or_equal() {
        let root = Path::new("/repo/project");
        assert!(is_under_or_equal(Path::new("/repo/project"), root));
        assert!(is_under_or_equal(Path::new("/repo/project/src/a.ts"), root));
        assert!(!is_under_or_equal(Path::new("/repo/project-other/a.ts"), root));
        assert!(!is_under_or_equal(Path::new("/repo"), root));
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/repo/project");
        assert_eq!(
            relative_to(Path::new("/repo/project/src/index.ts"), root),
            Some(PathBuf::from("src/index.ts"))
        );
        assert_eq!(relative_to(root, root), Some(PathBuf::new()));
        assert_eq!(relative_to(Path::new("/elsewhere/a.ts"), root), None);
    }
}
