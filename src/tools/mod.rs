//! # Tools
//!
//! The fixed capability set offered to the model. A raw [`ToolCall`] is turned into a
//! [`ToolRequest`] exactly once, at the executor boundary; from then on every tool is a
//! variant of a closed enum and dispatch is an exhaustive `match`.

use crate::error::ToolError;
use crate::sandbox::Sandbox;
use crate::session::ToolCall;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod apply_patch;
pub mod list_files;
pub mod read_file;
pub mod shell;
pub mod write_file;

pub use self::apply_patch::ApplyPatchArgs;
pub use self::list_files::ListFilesArgs;
pub use self::read_file::ReadFileArgs;
pub use self::shell::ShellArgs;
pub use self::write_file::WriteFileArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Shell,
    ReadFile,
    WriteFile,
    ListFiles,
    ApplyPatch,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::Shell,
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::ListFiles,
        ToolName::ApplyPatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Shell => "shell",
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::ListFiles => "list_files",
            ToolName::ApplyPatch => "apply_patch",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn schema(self) -> ToolSchema {
        match self {
            ToolName::Shell => shell::schema(),
            ToolName::ReadFile => read_file::schema(),
            ToolName::WriteFile => write_file::schema(),
            ToolName::ListFiles => list_files::schema(),
            ToolName::ApplyPatch => apply_patch::schema(),
        }
    }
}

/// Function description sent to the model: a name, prose, and a JSON schema for arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// The schemas of every tool, in a stable order.
pub fn manifest() -> Vec<ToolSchema> {
    ToolName::ALL.into_iter().map(ToolName::schema).collect()
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Shell(ShellArgs),
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    ListFiles(ListFilesArgs),
    ApplyPatch(ApplyPatchArgs),
}

impl ToolRequest {
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolError> {
        let name = ToolName::parse(&call.name).ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        Ok(match name {
            ToolName::Shell => ToolRequest::Shell(parse_args(call)?),
            ToolName::ReadFile => ToolRequest::ReadFile(parse_args(call)?),
            ToolName::WriteFile => ToolRequest::WriteFile(parse_args(call)?),
            ToolName::ListFiles => ToolRequest::ListFiles(parse_args(call)?),
            ToolName::ApplyPatch => ToolRequest::ApplyPatch(parse_args(call)?),
        })
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolRequest::Shell(_) => ToolName::Shell,
            ToolRequest::ReadFile(_) => ToolName::ReadFile,
            ToolRequest::WriteFile(_) => ToolName::WriteFile,
            ToolRequest::ListFiles(_) => ToolName::ListFiles,
            ToolRequest::ApplyPatch(_) => ToolName::ApplyPatch,
        }
    }

    /// Validates paths and renders what the call would do, without touching the filesystem.
    pub fn preview(&self, sandbox: &Sandbox) -> Result<String, ToolError> {
        match self {
            ToolRequest::Shell(args) => Ok(shell::preview(args)),
            ToolRequest::ReadFile(args) => read_file::preview(args, sandbox),
            ToolRequest::WriteFile(args) => write_file::preview(args, sandbox),
            ToolRequest::ListFiles(args) => list_files::preview(args, sandbox),
            ToolRequest::ApplyPatch(args) => apply_patch::preview(args, sandbox),
        }
    }
}

fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, ToolError> {
    let arguments = match &call.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: call.name.clone(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_covers_every_tool() {
        let names: Vec<&str> = manifest().iter().map(|schema| schema.name).collect();
        assert_eq!(names, vec!["shell", "read_file", "write_file", "list_files", "apply_patch"]);
        for schema in manifest() {
            assert_eq!(schema.parameters["type"], "object");
        }
    }

    #[test]
    fn test_from_call_parses_arguments() {
        let call = ToolCall::new("c1", "write_file", json!({ "path": "a.txt", "content": "x" }));
        assert_eq!(
            ToolRequest::from_call(&call).unwrap(),
            ToolRequest::WriteFile(WriteFileArgs {
                path: "a.txt".to_string(),
                content: "x".to_string()
            })
        );
    }

    #[test]
    fn test_list_files_path_defaults_to_root() {
        let call = ToolCall::new("c1", "list_files", json!({}));
        let ToolRequest::ListFiles(args) = ToolRequest::from_call(&call).unwrap() else {
            panic!("expected list_files request");
        };
        assert_eq!(args.path, ".");
    }

    #[test]
    fn test_unknown_tool_and_bad_arguments() {
        let unknown = ToolCall::new("c1", "rm_rf", json!({}));
        assert_eq!(
            ToolRequest::from_call(&unknown).unwrap_err(),
            ToolError::UnknownTool("rm_rf".to_string())
        );

        let missing = ToolCall::new("c2", "read_file", json!({}));
        assert!(matches!(
            ToolRequest::from_call(&missing),
            Err(ToolError::InvalidArguments { .. })
        ));
    }
}
