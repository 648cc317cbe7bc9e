use crate::error::ToolError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Bound on chained dangling symlinks, matching the usual `SYMLOOP_MAX`.
const MAX_SYMLINK_HOPS: usize = 40;

/// Confines path arguments to a single working directory.
///
/// Resolution is two-staged:
/// 1. The path is joined onto the root and normalized lexically, so `..` and
///    absolute paths are checked before anything touches the disk.
/// 2. The deepest existing ancestor is canonicalized, so a symlink inside the
///    workdir that points elsewhere is rejected as well. Dangling symlinks count as
///    existing and are followed to where a write through them would land.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(workdir: impl AsRef<Path>) -> Result<Self> {
        let workdir = workdir.as_ref();
        let root = workdir
            .canonicalize()
            .with_context(|| format!("Failed to resolve working directory '{}'", workdir.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Working directory '{}' is not a directory", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` against the root. The root itself counts as inside.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let violation = || ToolError::SandboxViolation {
            path: path.to_string(),
        };

        let joined = self.root.join(path);
        let normalized = normalize(&joined).ok_or_else(violation)?;
        if !normalized.starts_with(&self.root) {
            return Err(violation());
        }

        if !self.stays_inside(&normalized, MAX_SYMLINK_HOPS) {
            return Err(violation());
        }
        Ok(normalized)
    }

    fn stays_inside(&self, path: &Path, hops: usize) -> bool {
        // `symlink_metadata` does not follow the final link, so dangling links are found too.
        let mut existing = path;
        while existing.symlink_metadata().is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return false,
            }
        }
        if let Ok(canonical) = existing.canonicalize() {
            return canonical.starts_with(&self.root);
        }

        // Dangling link: check its target with the rest of the path appended.
        if hops == 0 {
            return false;
        }
        let (Ok(target), Some(parent), Ok(rest)) = (
            fs::read_link(existing),
            existing.parent().and_then(|p| p.canonicalize().ok()),
            path.strip_prefix(existing),
        ) else {
            return false;
        };
        match normalize(&parent.join(target)) {
            Some(target) => self.stays_inside(&target.join(rest), hops - 1),
            None => false,
        }
    }

    /// The path relative to the root, for messages shown to the model.
    pub fn display(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => resolved.display().to_string(),
        }
    }
}

/// Lexically removes `.` and `..`. Returns `None` when `..` climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::Builder;

    fn setup_sandbox() -> (tempfile::TempDir, Sandbox) {
        let tmp_dir = Builder::new().prefix("sandbox-test-").tempdir().unwrap();
        let workdir = tmp_dir.path().join("work");
        fs::create_dir_all(workdir.join("src")).unwrap();
        fs::write(workdir.join("src/lib.rs"), "content").unwrap();
        fs::write(tmp_dir.path().join("secret.txt"), "secret").unwrap();
        let sandbox = Sandbox::new(&workdir).unwrap();
        (tmp_dir, sandbox)
    }

    #[test]
    fn test_existing_file_inside() {
        let (_tmp_dir, sandbox) = setup_sandbox();
        let resolved = sandbox.resolve("src/lib.rs").unwrap();
        assert_eq!(resolved, sandbox.root().join("src/lib.rs"));
        assert_eq!(sandbox.display(&resolved), "src/lib.rs");
    }

    #[test]
    fn test_new_nested_file_inside() {
        let (_tmp_dir, sandbox) = setup_sandbox();
        let resolved = sandbox.resolve("a/b/c.txt").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
    }

    #[test]
    fn test_root_and_dot_segments() {
        let (_tmp_dir, sandbox) = setup_sandbox();
        assert_eq!(sandbox.resolve(".").unwrap(), sandbox.root());
        assert_eq!(sandbox.resolve("src/../src/./lib.rs").unwrap(), sandbox.root().join("src/lib.rs"));
        assert_eq!(sandbox.display(sandbox.root()), ".");
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_tmp_dir, sandbox) = setup_sandbox();
        for path in ["../secret.txt", "src/../../secret.txt", "../work2/x", "../../../../../../etc/passwd"] {
            assert!(
                matches!(sandbox.resolve(path), Err(ToolError::SandboxViolation { .. })),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_paths() {
        let (tmp_dir, sandbox) = setup_sandbox();
        let outside = tmp_dir.path().join("secret.txt");
        assert!(sandbox.resolve(outside.to_str().unwrap()).is_err());
        assert!(sandbox.resolve("/etc/passwd").is_err());

        let inside = sandbox.root().join("src/lib.rs");
        assert!(sandbox.resolve(inside.to_str().unwrap()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let (tmp_dir, sandbox) = setup_sandbox();
        std::os::unix::fs::symlink(tmp_dir.path(), sandbox.root().join("escape")).unwrap();

        assert!(matches!(
            sandbox.resolve("escape/secret.txt"),
            Err(ToolError::SandboxViolation { .. })
        ));
        assert!(sandbox.resolve("escape/new_file.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlinks() {
        let (tmp_dir, sandbox) = setup_sandbox();
        let root = sandbox.root();
        std::os::unix::fs::symlink("../outside.txt", root.join("link")).unwrap();
        std::os::unix::fs::symlink(tmp_dir.path().join("missing_dir"), root.join("dir_link")).unwrap();
        std::os::unix::fs::symlink("link", root.join("chained")).unwrap();
        std::os::unix::fs::symlink("src/new.rs", root.join("inside_link")).unwrap();
        std::os::unix::fs::symlink("loop_b", root.join("loop_a")).unwrap();
        std::os::unix::fs::symlink("loop_a", root.join("loop_b")).unwrap();

        for path in ["link", "dir_link/file.txt", "chained", "loop_a"] {
            assert!(
                matches!(sandbox.resolve(path), Err(ToolError::SandboxViolation { .. })),
                "{path} should be rejected"
            );
        }
        assert_eq!(sandbox.resolve("inside_link").unwrap(), root.join("inside_link"));
        assert!(!tmp_dir.path().join("outside.txt").exists());
    }

    #[test]
    fn test_missing_workdir() {
        let (tmp_dir, _sandbox) = setup_sandbox();
        assert!(Sandbox::new(tmp_dir.path().join("nope")).is_err());
    }
}
