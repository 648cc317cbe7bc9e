use super::ToolSchema;
use crate::error::ToolError;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShellArgs {
    pub command: String,
    /// Overrides the executor's default timeout for this call.
    #[serde(default, alias = "timeout")]
    pub timeout_seconds: Option<u64>,
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutput {
    pub output: String,
    pub exit_code: i32,
}

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: "shell",
        description: "Execute a shell command in the working directory. Use for running tests, builds, git operations, etc.
Stdout and stderr are captured. A non-zero exit code is reported as a failure together with the output.
Commands that run longer than the timeout are killed.",
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute. For example: cargo test"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Optional timeout in seconds for this command."
                }
            },
            "required": ["command"]
        }),
    }
}

pub fn preview(args: &ShellArgs) -> String {
    format!("$ {}", args.command)
}

/// Runs `sh -c <command>` with `workdir` as current directory.
///
/// The command runs in its own process group. The timeout covers both the shell and
/// collecting its output, so background jobs holding the pipes open cannot stall the
/// call. On timeout the whole group is killed before returning.
pub async fn run(args: &ShellArgs, workdir: &Path, default_timeout: Duration) -> Result<ShellOutput, ToolError> {
    if args.command.trim().is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: "shell".to_string(),
            message: "No command provided".to_string(),
        });
    }
    let timeout = args.timeout_seconds.map(Duration::from_secs).unwrap_or(default_timeout);
    let deadline = Instant::now() + timeout;

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&args.command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    // With `process_group(0)` the group id is the shell's pid.
    let pgid = child.id();
    debug!(command = %args.command, pid = ?pgid, "spawned shell command");

    let mut stdout = tokio::spawn(read_all(child.stdout.take()));
    let mut stderr = tokio::spawn(read_all(child.stderr.take()));
    let timed_out = || {
        warn!(command = %args.command, timeout_secs = timeout.as_secs(), "shell command timed out, killing");
        ToolError::Timeout {
            seconds: timeout.as_secs(),
        }
    };

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            kill_process_group(pgid);
            if let Err(e) = child.kill().await {
                debug!(err = %e, "failed to kill shell");
            }
            stdout.abort();
            stderr.abort();
            return Err(timed_out());
        }
    };

    let collected = tokio::time::timeout_at(deadline, async { ((&mut stdout).await, (&mut stderr).await) }).await;
    let (stdout, stderr) = match collected {
        Ok((stdout, stderr)) => (stdout.unwrap_or_default(), stderr.unwrap_or_default()),
        Err(_) => {
            // The shell exited but a background job still holds its output open.
            kill_process_group(pgid);
            stdout.abort();
            stderr.abort();
            return Err(timed_out());
        }
    };

    let mut output = strip_ansi_escapes::strip_str(String::from_utf8_lossy(&stdout));
    let stderr = strip_ansi_escapes::strip_str(String::from_utf8_lossy(&stderr));
    if !stderr.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str("[stderr]\n");
        output.push_str(&stderr);
    }

    Ok(ShellOutput {
        output: output.trim_end().to_string(),
        // Killed by a signal: no exit code.
        exit_code: status.code().unwrap_or(-1),
    })
}

#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else {
        return;
    };
    // SAFETY: killpg only sends a signal to the group created for this command.
    let result = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(err = %err, pgid, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            debug!(err = %e, "failed to read child output");
        }
    }
    buffer
}
