//! Bounds every agent-supplied path to a bundle's extraction root before any filesystem
//! operation touches it.

use std::path::{Component, Path, PathBuf};

use crate::error::PathGuardError;

/// Normalize `requested` against `root` and verify the result cannot escape `root`.
///
/// Leading slashes on `requested` are stripped (an agent sending an absolute-looking path means
/// "relative to the bundle", not "relative to the host filesystem"). `..` and lone `.` segments
/// are rejected outright rather than resolved away, since a path we can't prove stays under
/// `root` without touching the filesystem (e.g. a dangling symlink) should fail safe.
pub fn guard(root: &Path, requested: &str) -> Result<PathBuf, PathGuardError> {
    let stripped = requested.trim_start_matches('/');

    let mut joined = root.to_path_buf();
    for component in Path::new(stripped).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => return Err(PathGuardError::NotSafe),
            Component::ParentDir => return Err(PathGuardError::NotSafe),
            Component::RootDir | Component::Prefix(_) => return Err(PathGuardError::NotSafe),
        }
    }

    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canonical_joined = joined
        .canonicalize()
        .unwrap_or_else(|_| joined.clone());

    if canonical_joined == canonical_root {
        return Ok(joined);
    }

    let root_prefix = {
        let mut p = canonical_root.clone();
        p.push("");
        p
    };

    if canonical_joined.starts_with(&root_prefix) {
        Ok(joined)
    } else {
        Err(PathGuardError::NotSafe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cluster-resources")).unwrap();
        fs::write(dir.path().join("cluster-resources/pods.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn accepts_plain_relative_path() {
        let dir = tmp_root();
        let got = guard(dir.path(), "cluster-resources/pods.json").unwrap();
        assert!(got.ends_with("cluster-resources/pods.json"));
    }

    #[test]
    fn strips_leading_slash() {
        let dir = tmp_root();
        let got = guard(dir.path(), "/cluster-resources/pods.json").unwrap();
        assert!(got.ends_with("cluster-resources/pods.json"));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let dir = tmp_root();
        assert!(guard(dir.path(), "../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_embedded_parent_dir() {
        let dir = tmp_root();
        assert!(guard(dir.path(), "cluster-resources/../../etc/passwd").is_err());
    }

    #[test]
    fn root_itself_is_allowed() {
        let dir = tmp_root();
        let got = guard(dir.path(), "").unwrap();
        assert_eq!(got, dir.path());
    }
}
