use super::ToolSchema;
use crate::error::ToolError;
use crate::sandbox::Sandbox;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
}

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: "read_file",
        description: "Read the contents of a file at the given path. Paths are relative to the working directory.",
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative to working directory)"
                }
            },
            "required": ["path"]
        }),
    }
}

pub fn preview(args: &ReadFileArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    Ok(format!("read {}", sandbox.display(&resolved)))
}

pub fn run(args: &ReadFileArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    if !resolved.is_file() {
        return Err(ToolError::NotFound {
            path: args.path.clone(),
        });
    }
    let bytes = fs::read(&resolved)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    fn setup() -> (tempfile::TempDir, Sandbox) {
        let tmp_dir = Builder::new().prefix("read-file-test-").tempdir().unwrap();
        fs::create_dir(tmp_dir.path().join("dir")).unwrap();
        fs::write(tmp_dir.path().join("a.txt"), "hello\n").unwrap();
        let sandbox = Sandbox::new(tmp_dir.path()).unwrap();
        (tmp_dir, sandbox)
    }

    fn read(path: &str, sandbox: &Sandbox) -> Result<String, ToolError> {
        run(&ReadFileArgs { path: path.to_string() }, sandbox)
    }

    #[test]
    fn test_reads_file() {
        let (_tmp_dir, sandbox) = setup();
        assert_eq!(read("a.txt", &sandbox).unwrap(), "hello\n");
    }

    #[test]
    fn test_missing_file_and_directory() {
        let (_tmp_dir, sandbox) = setup();
        assert!(matches!(read("nope.txt", &sandbox), Err(ToolError::NotFound { .. })));
        assert!(matches!(read("dir", &sandbox), Err(ToolError::NotFound { .. })));
    }

    #[test]
    fn test_escape_is_rejected() {
        let (_tmp_dir, sandbox) = setup();
        assert!(matches!(read("../a.txt", &sandbox), Err(ToolError::SandboxViolation { .. })));
    }
}
