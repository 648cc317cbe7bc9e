use super::ToolSchema;
use crate::diff;
use crate::error::ToolError;
use crate::sandbox::Sandbox;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: "write_file",
        description: "Write content to a file at the given path. Creates the file (and any missing parent directories) if it doesn't exist, overwrites it if it does.",
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative to working directory)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        }),
    }
}

/// Shows the change as a diff against the current file, if any.
pub fn preview(args: &WriteFileArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    let current = if resolved.is_file() {
        fs::read_to_string(&resolved)?
    } else {
        String::new()
    };
    let display = sandbox.display(&resolved);
    Ok(diff::colorize(&diff::unified_diff(&display, &current, &args.content)))
}

pub fn run(args: &WriteFileArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    if resolved.is_dir() {
        return Err(ToolError::Io(format!("'{}' is a directory", args.path)));
    }
    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&resolved, &args.content)?;
    Ok(format!("Wrote {} bytes to {}", args.content.len(), sandbox.display(&resolved)))
}
