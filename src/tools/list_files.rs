use super::ToolSchema;
use crate::error::ToolError;
use crate::sandbox::Sandbox;
use serde::Deserialize;
use std::fs;

fn default_path() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default = "default_path")]
    pub path: String,
}

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: "list_files",
        description: "List the entries of a directory, one per line in lexical order. Directories carry a trailing '/'. Not recursive.",
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (relative to working directory, defaults to '.')"
                }
            },
            "required": []
        }),
    }
}

pub fn preview(args: &ListFilesArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    Ok(format!("list {}", sandbox.display(&resolved)))
}

pub fn run(args: &ListFilesArgs, sandbox: &Sandbox) -> Result<String, ToolError> {
    let resolved = sandbox.resolve(&args.path)?;
    if !resolved.is_dir() {
        return Err(ToolError::NotFound {
            path: args.path.clone(),
        });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&resolved)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();

    Ok(entries.join("\n"))
}
