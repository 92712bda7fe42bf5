//! Virtual POSIX path arithmetic.
//!
//! Sandbox paths are plain `/`-separated strings regardless of the host OS.
//! Every helper returns `None` when `..` would climb above `/`.

/// Collapse `.`, `..`, repeated and trailing separators into an absolute path.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn join(base: &str, path: &str) -> Option<String> {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{base}/{path}"))
    }
}

/// Parent directory of `path`; `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let normalized = normalize(path)?;
    if normalized == "/" {
        return None;
    }
    let idx = normalized.rfind('/')?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(normalized[..idx].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_segments() {
        assert_eq!(normalize("/home//project/./src/"), Some("/home/project/src".into()));
        assert_eq!(normalize("/home/project/src/../lib"), Some("/home/project/lib".into()));
        assert_eq!(normalize("/"), Some("/".into()));
    }

    #[test]
    fn normalize_rejects_climbing_above_root() {
        assert_eq!(normalize("/home/../../etc"), None);
    }

    #[test]
    fn join_keeps_absolute_paths() {
        assert_eq!(join("/home/project", "/etc/hosts"), Some("/etc/hosts".into()));
        assert_eq!(
            join("/home/project", "src/a/b.txt"),
            Some("/home/project/src/a/b.txt".into())
        );
    }

    #[test]
    fn parent_strips_last_segment() {
        assert_eq!(parent("/home/project/src/a/b.txt"), Some("/home/project/src/a".into()));
        assert_eq!(parent("/home/project/src/a/"), Some("/home/project/src".into()));
        assert_eq!(parent("/top"), Some("/".into()));
        assert_eq!(parent("/"), None);
    }
}
