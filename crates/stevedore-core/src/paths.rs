//! Path helpers for remote (always Linux) destinations

use std::path::{Component, Path};

/// Replace backslashes with forward slashes
pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexically clean a slash-separated path (`.` and `..` resolved, no trailing slash)
pub fn clean(path: &str) -> String {
    let path = to_slash(path);
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join a remote base directory and a relative path
pub fn join_remote(base: &str, relative: &str) -> String {
    clean(&format!("{}/{}", base, relative))
}

/// Whether `other` is `base` or lies anywhere below it
pub fn is_sub_dir(base: &str, other: &str) -> bool {
    let base = clean(base);
    let other = clean(other);
    if base == other {
        return true;
    }
    let prefix = if base.ends_with('/') {
        base
    } else {
        format!("{}/", base)
    };
    other.starts_with(&prefix)
}

/// Relative path of `path` under `root`, slash-separated
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clean() {
        assert_eq!(clean("/opt/app-root/"), "/opt/app-root");
        assert_eq!(clean("/opt/./app-root/../x"), "/opt/x");
        assert_eq!(clean("a\\b\\c"), "a/b/c");
        assert_eq!(clean(""), ".");
        assert_eq!(clean("/.."), "/");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/app/src", "foo.txt"), "/app/src/foo.txt");
        assert_eq!(join_remote("/app/src/", "dir\\foo.txt"), "/app/src/dir/foo.txt");
    }

    #[test]
    fn test_is_sub_dir() {
        assert!(is_sub_dir("/opt/app-root", "/opt/app-root"));
        assert!(is_sub_dir("/opt/app-root", "/opt/app-root/src"));
        assert!(is_sub_dir("/opt/app-root/", "/opt/app-root/a/b"));
        assert!(!is_sub_dir("/opt/app-root", "/opt/app-root-2"));
        assert!(!is_sub_dir("/opt/app-root", "/deployments"));
    }

    #[test]
    fn test_relative_slash() {
        let root = PathBuf::from("/work/project");
        assert_eq!(
            relative_slash(&root, &root.join("src").join("main.go")).as_deref(),
            Some("src/main.go")
        );
        assert_eq!(relative_slash(&root, &root).as_deref(), Some(""));
        assert_eq!(relative_slash(&root, Path::new("/elsewhere")), None);
    }
}
