//! Shell execution: run a command with `sh -c` inside the workspace, bounded by a timeout.
//! Non-zero exits are tool errors that keep stdout and stderr for the model.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::fs::Workspace;
use super::registry::{opt_u64, str_arg, FieldKind, InputSchema, Tool, ToolError, ToolHandler};
use super::truncate_output;
use crate::message::ToolArgs;

struct Bash {
    workspace: Arc<Workspace>,
    default_timeout: Duration,
    max_output_bytes: usize,
}

#[async_trait]
impl ToolHandler for Bash {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let command = str_arg(&args, "command")?;
        let timeout = opt_u64(&args, "timeout_secs")
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        log::debug!("bash: {}", command);
        let (shell, shell_arg) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        let child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| ToolError::Failed(format!("command timed out after {}s", timeout.as_secs())))?
            .map_err(|e| ToolError::Failed(format!("exec failed: {}", e)))?;

        let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), self.max_output_bytes);
        let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), self.max_output_bytes);
        if !output.status.success() {
            return Err(ToolError::Command {
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        let mut result = format!("Exit code: {}\n", output.status.code().unwrap_or(0));
        if !stdout.is_empty() {
            result.push_str("\n--- stdout ---\n");
            result.push_str(&stdout);
        }
        if !stderr.is_empty() {
            result.push_str("\n--- stderr ---\n");
            result.push_str(&stderr);
        }
        Ok(result)
    }
}

pub fn bash_tool(workspace: Arc<Workspace>, default_timeout: Duration, max_output_bytes: usize) -> Tool {
    Tool::new(
        "bash",
        "Run a shell command in the workspace directory. Returns exit code, stdout and stderr.",
        InputSchema::new()
            .required("command", FieldKind::String, "Shell command to execute")
            .optional("timeout_secs", FieldKind::Integer, "Timeout in seconds"),
        Arc::new(Bash {
            workspace,
            default_timeout,
            max_output_bytes,
        }),
    )
}
