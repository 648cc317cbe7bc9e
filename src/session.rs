//! # Session Store
//!
//! An append-only log of conversation messages bound to a working directory.
//! There is no operation that deletes or reorders a message; `reset` starts a
//! new, empty log for the same directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the model-facing layer; tool results refer back to it.
    pub id: String,
    pub name: String,
    /// Normally a JSON object. Arguments the model sent as unparseable text are kept
    /// as a string so the executor can report them back as invalid.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn model(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    working_dir: PathBuf,
    system_prompt: Option<String>,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    request_count: usize,
}

impl Session {
    pub fn new(working_dir: impl Into<PathBuf>, system_prompt: Option<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            system_prompt,
            messages: Vec::new(),
            created_at: Utc::now(),
            request_count: 0,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn append(&mut self, message: Message) {
        if message.role == Role::User {
            self.request_count += 1;
        }
        self.messages.push(message);
    }

    /// A copy of the log, independent of later appends.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Starts an empty log for the same working directory and system prompt.
    pub fn reset(&mut self) {
        *self = Self::new(self.working_dir.clone(), self.system_prompt.take());
    }

    pub fn summary(&self) -> String {
        format!(
            "Turn {} | {} messages | {}",
            self.request_count,
            self.messages.len(),
            self.working_dir.display()
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write session to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {}", path.display()))?;
        let session = serde_json::from_str(&json)
            .with_context(|| format!("Invalid session file {}", path.display()))?;
        Ok(session)
    }
}
