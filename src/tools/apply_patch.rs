//! `apply_patch`: applies unified-diff text to files under the working directory.
//!
//! Every path in the patch is checked against the sandbox before anything is read,
//! and the patch engine only writes once all file-diffs have applied.

use super::ToolSchema;
use crate::diff;
use crate::error::{PatchError, ToolError};
use crate::patch::{self, FileStore, Patch};
use crate::sandbox::Sandbox;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplyPatchArgs {
    #[serde(alias = "diff")]
    pub patch: String,
}

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: "apply_patch",
        description: "Apply a unified diff to one or more files. Use for targeted edits of existing files.
Each file needs '--- a/path' and '+++ b/path' headers followed by '@@ -l,n +l,n @@' hunks.
Use '--- /dev/null' to create a file and '+++ /dev/null' to delete one.
Context and removed lines must match the current file exactly; otherwise nothing is changed and the conflicting hunk is reported.",
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "patch": {
                    "type": "string",
                    "description": "The unified diff to apply"
                }
            },
            "required": ["patch"]
        }),
    }
}

/// Parses the patch and checks that every path stays inside the sandbox.
fn plan(args: &ApplyPatchArgs, sandbox: &Sandbox) -> Result<Patch, ToolError> {
    let patch = patch::parse(&args.patch)?;
    for path in patch.paths() {
        sandbox.resolve(path)?;
    }
    Ok(patch)
}

pub fn preview(args: &ApplyPatchArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    plan(args, sandbox)?;
    Ok(diff::colorize(&args.patch))
}

pub fn run(args: &ApplyPatchArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let patch = plan(args, sandbox)?;
    let mut store = WorkdirStore { sandbox };
    let applied = patch::apply(&patch, &mut store)?;
    Ok(format!("Patch applied to {}", applied.join(", ")))
}

/// Patch-engine store backed by the sandboxed working directory.
struct WorkdirStore<'a> {
    sandbox: &'a Sandbox,
}

impl WorkdirStore<'_> {
    fn resolve(&self, path: &str) -> Result<PathBuf, PatchError> {
        self.sandbox.resolve(path).map_err(|e| PatchError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

fn io_error(path: &str, e: std::io::Error) -> PatchError {
    PatchError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}

impl FileStore for WorkdirStore<'_> {
    fn read(&self, path: &str) -> Result<Option<String>, PatchError> {
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&resolved).map(Some).map_err(|e| io_error(path, e))
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<(), PatchError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }
        fs::write(&resolved, contents).map_err(|e| io_error(path, e))
    }

    fn remove(&mut self, path: &str) -> Result<(), PatchError> {
        let resolved = self.resolve(path)?;
        fs::remove_file(&resolved).map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, Sandbox) {
        let tmp_dir = Builder::new().prefix("apply-patch-test-").tempdir().unwrap();
        let workdir = tmp_dir.path().join("work");
        fs::create_dir(&workdir).unwrap();
        for (path, contents) in files {
            let full = workdir.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, contents).unwrap();
        }
        let sandbox = Sandbox::new(&workdir).unwrap();
        (tmp_dir, sandbox)
    }

    fn apply(text: &str, sandbox: &Sandbox) -> Result<String, ToolError> {
        run(&ApplyPatchArgs { patch: text.to_string() }, sandbox)
    }

    #[test]
    fn test_applies_to_workdir_files() {
        let (_tmp_dir, sandbox) = setup(&[("x.txt", "foo\n")]);

        let message = apply("--- a/x.txt\n+++ b/x.txt\n@@ -1,1 +1,2 @@\n foo\n+bar\n", &sandbox).unwrap();

        assert_eq!(message, "Patch applied to x.txt");
        assert_eq!(fs::read_to_string(sandbox.root().join("x.txt")).unwrap(), "foo\nbar\n");
    }

    #[test]
    fn test_creates_nested_and_deletes() {
        let (_tmp_dir, sandbox) = setup(&[("old.txt", "bye\n")]);
        let text = "--- /dev/null\n+++ b/src/new.rs\n@@ -0,0 +1 @@\n+fn main() {}\n--- a/old.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-bye\n";

        apply(text, &sandbox).unwrap();

        assert_eq!(fs::read_to_string(sandbox.root().join("src/new.rs")).unwrap(), "fn main() {}\n");
        assert!(!sandbox.root().join("old.txt").exists());
    }

    #[test]
    fn test_escaping_path_touches_nothing() {
        let (tmp_dir, sandbox) = setup(&[("x.txt", "foo\n")]);
        let text = "--- a/x.txt\n+++ b/x.txt\n@@ -1 +1 @@\n-foo\n+bar\n--- /dev/null\n+++ b/../evil.txt\n@@ -0,0 +1 @@\n+pwned\n";

        let err = apply(text, &sandbox).unwrap_err();

        assert!(matches!(err, ToolError::SandboxViolation { .. }));
        assert_eq!(fs::read_to_string(sandbox.root().join("x.txt")).unwrap(), "foo\n");
        assert!(!tmp_dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_conflict_names_file_and_hunk() {
        let (_tmp_dir, sandbox) = setup(&[("x.txt", "a\nb\nc\n")]);
        let text = "--- a/x.txt\n+++ b/x.txt\n@@ -1 +1 @@\n-a\n+A\n@@ -3 +3 @@\n-z\n+Z\n";

        let err = apply(text, &sandbox).unwrap_err();

        assert_eq!(
            err,
            ToolError::Patch(PatchError::Conflict {
                path: "x.txt".to_string(),
                hunk: 2
            })
        );
        assert_eq!(fs::read_to_string(sandbox.root().join("x.txt")).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_malformed_patch() {
        let (_tmp_dir, sandbox) = setup(&[]);
        assert!(matches!(
            apply("please change foo to bar", &sandbox),
            Err(ToolError::Patch(PatchError::Malformed { .. }))
        ));
    }
}
