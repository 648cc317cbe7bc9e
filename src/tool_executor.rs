//! # Tool Executor
//!
//! Runs one [`ToolCall`] against the sandboxed working directory and always produces a
//! [`ToolResult`]. Lookup, argument, sandbox, approval and execution failures are all
//! captured in the result rather than returned as errors, so the agent loop can feed
//! them back to the model.

use crate::error::ToolError;
use crate::sandbox::Sandbox;
use crate::session::ToolCall;
use crate::tools::{ToolRequest, apply_patch, list_files, read_file, shell, write_file};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Decides whether a tool call may run. `preview` describes what the call would do.
pub trait Approval: Send + Sync {
    fn approve(&self, call: &ToolCall, preview: &str) -> bool;
}

impl<F> Approval for F
where
    F: Fn(&ToolCall, &str) -> bool + Send + Sync,
{
    fn approve(&self, call: &ToolCall, preview: &str) -> bool {
        self(call, preview)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    /// Command output or file content; on failure, whatever output was captured.
    pub output: String,
    pub error: Option<ToolError>,
}

impl ToolResult {
    fn succeeded(call: &ToolCall, output: String) -> Self {
        Self {
            call_id: call.id.clone(),
            success: true,
            output,
            error: None,
        }
    }

    fn failed(call: &ToolCall, error: ToolError, output: String) -> Self {
        Self {
            call_id: call.id.clone(),
            success: false,
            output,
            error: Some(error),
        }
    }

    fn from_outcome(call: &ToolCall, outcome: Result<String, ToolError>) -> Self {
        match outcome {
            Ok(output) => Self::succeeded(call, output),
            Err(error) => Self::failed(call, error, String::new()),
        }
    }

    /// The text the model sees for this result.
    pub fn message_content(&self) -> String {
        match &self.error {
            None => self.output.clone(),
            Some(error) if self.output.is_empty() => format!("Error: {error}"),
            Some(error) => format!("Error: {error}\n{}", self.output),
        }
    }
}

pub struct ToolExecutor {
    sandbox: Sandbox,
    shell_timeout: Duration,
    approval: Option<Arc<dyn Approval>>,
}

impl ToolExecutor {
    pub fn new(workdir: impl AsRef<Path>, shell_timeout: Duration) -> Result<Self> {
        Ok(Self {
            sandbox: Sandbox::new(workdir)?,
            shell_timeout,
            approval: None,
        })
    }

    /// Without an approval callback every call is auto-approved.
    pub fn with_approval(mut self, approval: Arc<dyn Approval>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn workdir(&self) -> &Path {
        self.sandbox.root()
    }

    #[instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let request = match ToolRequest::from_call(call) {
            Ok(request) => request,
            Err(e) => {
                warn!(err = %e, "rejected tool call before execution");
                return ToolResult::failed(call, e, String::new());
            }
        };

        if let Some(approval) = &self.approval {
            // Previewing also validates paths, so violations never reach the user.
            let preview = match request.preview(&self.sandbox) {
                Ok(preview) => preview,
                Err(e) => return ToolResult::failed(call, e, String::new()),
            };
            if !approval.approve(call, &preview) {
                info!("tool call rejected by approval callback");
                return ToolResult::failed(call, ToolError::Rejected, String::new());
            }
        }

        let result = match &request {
            ToolRequest::Shell(args) => match shell::run(args, self.sandbox.root(), self.shell_timeout).await {
                Ok(out) if out.exit_code == 0 => ToolResult::succeeded(call, out.output),
                Ok(out) => ToolResult::failed(call, ToolError::NonZeroExit { code: out.exit_code }, out.output),
                Err(e) => ToolResult::failed(call, e, String::new()),
            },
            ToolRequest::ReadFile(args) => ToolResult::from_outcome(call, read_file::run(args, &self.sandbox)),
            ToolRequest::WriteFile(args) => ToolResult::from_outcome(call, write_file::run(args, &self.sandbox)),
            ToolRequest::ListFiles(args) => ToolResult::from_outcome(call, list_files::run(args, &self.sandbox)),
            ToolRequest::ApplyPatch(args) => ToolResult::from_outcome(call, apply_patch::run(args, &self.sandbox)),
        };

        match &result.error {
            None => debug!(tool = request.name().as_str(), output_len = result.output.len(), "tool call succeeded"),
            Some(e) => warn!(tool = request.name().as_str(), err = %e, "tool call failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::Builder;

    fn setup() -> (tempfile::TempDir, ToolExecutor) {
        let tmp_dir = Builder::new().prefix("executor-test-").tempdir().unwrap();
        let workdir = tmp_dir.path().join("work");
        fs::create_dir(&workdir).unwrap();
        fs::write(workdir.join("a.txt"), "hello\n").unwrap();
        fs::write(tmp_dir.path().join("secret.txt"), "secret").unwrap();
        let executor = ToolExecutor::new(&workdir, Duration::from_secs(10)).unwrap();
        (tmp_dir, executor)
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", name, arguments)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_tmp_dir, executor) = setup();

        let written = executor
            .execute(&call("write_file", json!({ "path": "a.txt", "content": "hello\nworld\n" })))
            .await;
        assert!(written.success, "{written:?}");
        assert_eq!(written.call_id, "call_1");

        let read = executor.execute(&call("read_file", json!({ "path": "a.txt" }))).await;
        assert!(read.success);
        assert_eq!(read.output, "hello\nworld\n");
        assert_eq!(read.message_content(), "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_escaping_paths_are_violations_without_effects() {
        let (tmp_dir, executor) = setup();
        let calls = [
            call("read_file", json!({ "path": "../secret.txt" })),
            call("write_file", json!({ "path": "../secret.txt", "content": "overwritten" })),
            call("write_file", json!({ "path": "/tmp/../etc/evil", "content": "x" })),
            call("list_files", json!({ "path": "../" })),
            call(
                "apply_patch",
                json!({ "patch": "--- a/../secret.txt\n+++ b/../secret.txt\n@@ -1 +1 @@\n-secret\n+patched\n" }),
            ),
        ];

        for c in &calls {
            let result = executor.execute(c).await;
            assert!(!result.success);
            assert!(
                matches!(result.error, Some(ToolError::SandboxViolation { .. })),
                "{} should be a sandbox violation: {result:?}",
                c.name
            );
        }
        assert_eq!(fs::read_to_string(tmp_dir.path().join("secret.txt")).unwrap(), "secret");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_writes_through_dangling_symlink_are_violations() {
        let (tmp_dir, executor) = setup();
        std::os::unix::fs::symlink("../outside.txt", executor.workdir().join("link")).unwrap();
        let patch = "--- /dev/null\n+++ b/link\n@@ -0,0 +1 @@\n+pwned\n";

        let written = executor
            .execute(&call("write_file", json!({ "path": "link", "content": "pwned" })))
            .await;
        let patched = executor.execute(&call("apply_patch", json!({ "patch": patch }))).await;

        assert!(matches!(written.error, Some(ToolError::SandboxViolation { .. })), "{written:?}");
        assert!(matches!(patched.error, Some(ToolError::SandboxViolation { .. })), "{patched:?}");
        assert!(!tmp_dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_shell_failure_keeps_output() {
        let (_tmp_dir, executor) = setup();

        let result = executor.execute(&call("shell", json!({ "command": "cat a.txt; exit 2" }))).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(ToolError::NonZeroExit { code: 2 }));
        assert_eq!(result.output, "hello");
        assert_eq!(result.message_content(), "Error: Exit code: 2\nhello");
    }

    #[tokio::test]
    async fn test_rejected_call_has_no_effect() {
        let (_tmp_dir, executor) = setup();
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&asked);
        let executor = executor.with_approval(Arc::new(move |_call: &ToolCall, _preview: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));

        let write = executor
            .execute(&call("write_file", json!({ "path": "new.txt", "content": "x" })))
            .await;
        let shell = executor.execute(&call("shell", json!({ "command": "touch touched.txt" }))).await;

        assert_eq!(write.error, Some(ToolError::Rejected));
        assert_eq!(shell.error, Some(ToolError::Rejected));
        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert!(!executor.workdir().join("new.txt").exists());
        assert!(!executor.workdir().join("touched.txt").exists());
    }

    #[tokio::test]
    async fn test_approval_sees_preview_and_skips_invalid_calls() {
        let (_tmp_dir, executor) = setup();
        let previews = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&previews);
        let executor = executor.with_approval(Arc::new(move |_call: &ToolCall, preview: &str| {
            seen.lock().unwrap().push(strip_ansi_escapes::strip_str(preview));
            true
        }));

        let ok = executor.execute(&call("shell", json!({ "command": "echo hi" }))).await;
        let escape = executor.execute(&call("read_file", json!({ "path": "../secret.txt" }))).await;

        assert_eq!(ok.output, "hi");
        assert!(matches!(escape.error, Some(ToolError::SandboxViolation { .. })));
        assert_eq!(*previews.lock().unwrap(), vec!["$ echo hi".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_invalid_json() {
        let (_tmp_dir, executor) = setup();

        let unknown = executor.execute(&call("delete_everything", json!({}))).await;
        assert_eq!(unknown.error, Some(ToolError::UnknownTool("delete_everything".to_string())));

        let garbled = executor
            .execute(&call("read_file", serde_json::Value::String("{path: a.txt".to_string())))
            .await;
        assert!(matches!(garbled.error, Some(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_patch_conflict_is_reported() {
        let (_tmp_dir, executor) = setup();
        let patch = "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-goodbye\n+hi\n";

        let result = executor.execute(&call("apply_patch", json!({ "patch": patch }))).await;

        assert!(!result.success);
        assert!(result.message_content().contains("hunk 1"));
    }
}
