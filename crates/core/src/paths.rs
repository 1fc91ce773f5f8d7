//! Lexical path helpers shared by the config and backend crates.
//!
//! Pulumi's `file:` backends are resolved without touching the filesystem, so
//! these helpers deliberately operate on path text alone: no symlink
//! resolution, no existence checks.

use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` or `~/...` to the current user's home directory.
///
/// `~other` (another user's home) is returned untouched, as is any path that
/// does not begin with a tilde.
#[must_use]
pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Collapse `.` and `..` components lexically, like Python's
/// `os.path.normpath`.
///
/// Leading `..` components of a relative path are preserved; `..` at an
/// absolute root is dropped.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    let mut depth: usize = 0;
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::Prefix(p) => {
                result.push(p.as_os_str());
            }
            Component::RootDir => {
                absolute = true;
                result.push(Component::RootDir);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    result.pop();
                    depth -= 1;
                } else if !absolute {
                    result.push(Component::ParentDir);
                }
            }
            Component::Normal(c) => {
                result.push(c);
                depth += 1;
            }
        }
    }
    if result.as_os_str().is_empty() {
        result.push(Component::CurDir);
    }
    result
}

/// Join `path` onto `base` and normalize, like Python's
/// `os.path.abspath(os.path.join(base, path))` for an absolute `base`.
///
/// An absolute `path` wins outright.
#[must_use]
pub fn abs_join(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base.join(path))
    }
}

/// Express `path` relative to `base`, like Python's `os.path.relpath`.
///
/// Both arguments are normalized first; the result may begin with `..`
/// components when `path` lies outside `base`.
#[must_use]
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize_lexically(path);
    let base = normalize_lexically(base);
    let mut path_parts = path.components().peekable();
    let mut base_parts = base.components().peekable();
    while let (Some(p), Some(b)) = (path_parts.peek(), base_parts.peek()) {
        if p != b {
            break;
        }
        path_parts.next();
        base_parts.next();
    }
    let mut result = PathBuf::new();
    for component in base_parts {
        if !matches!(component, Component::RootDir | Component::Prefix(_)) {
            result.push(Component::ParentDir);
        }
    }
    for component in path_parts {
        result.push(component);
    }
    if result.as_os_str().is_empty() {
        result.push(Component::CurDir);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_lexically(Path::new("")), PathBuf::from("."));
    }

    #[test]
    fn abs_join_prefers_absolute_path() {
        assert_eq!(
            abs_join(Path::new("/base"), Path::new("/other/x")),
            PathBuf::from("/other/x")
        );
        assert_eq!(
            abs_join(Path::new("/base"), Path::new("sub/../x")),
            PathBuf::from("/base/x")
        );
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user("/a/b"), PathBuf::from("/a/b"));
        assert_eq!(expand_user("rel/path"), PathBuf::from("rel/path"));
    }

    #[test]
    fn expand_user_expands_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_user("~"), home);
            assert_eq!(expand_user("~/x"), home.join("x"));
        }
    }

    #[test]
    fn relative_to_descends_and_climbs() {
        assert_eq!(
            relative_to(Path::new("/a/b/state"), Path::new("/a/b")),
            PathBuf::from("state")
        );
        assert_eq!(
            relative_to(Path::new("/a/shared/state"), Path::new("/a/b/c")),
            PathBuf::from("../../shared/state")
        );
        assert_eq!(
            relative_to(Path::new("/a/b"), Path::new("/a/b")),
            PathBuf::from(".")
        );
    }
}
