//! Scoped execution of external tools with a deadline

use crate::error::ToolError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured result of a tool that exited successfully.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// One invocation of an external program.
///
/// The child is killed if the deadline passes or if the future running it is
/// dropped, so an abandoned run never leaves a yt-dlp or ffmpeg process behind.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    fn tool_name(&self) -> String {
        tool_name(&self.program)
    }

    /// Run to completion, requiring a zero exit status.
    pub async fn execute(&self) -> Result<ToolOutput, ToolError> {
        let output = self.execute_unchecked().await?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.tool_name(),
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run to completion and return the output whatever the exit status.
    pub async fn execute_unchecked(&self) -> Result<ToolOutput, ToolError> {
        let tool = self.tool_name();
        trace!("Running {} {:?}", self.program.display(), self.args);

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        // On timeout the wait future is dropped together with the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Io {
                tool: tool.clone(),
                source,
            })?,
            Err(_) => {
                debug!("{} exceeded {:?}, killed", tool, self.timeout);
                return Err(ToolError::Timeout {
                    tool,
                    timeout: self.timeout,
                });
            }
        };

        Ok(ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let out = ToolCommand::new("sh")
            .args(["-c", "echo hello"])
            .execute()
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_stderr() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .execute()
            .await
            .unwrap_err();

        match err {
            ToolError::Failed { tool, code, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unchecked_returns_failed_output() {
        let out = ToolCommand::new("sh")
            .args(["-c", "exit 1"])
            .execute_unchecked()
            .await
            .unwrap();
        assert!(!out.status.success());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = ToolCommand::new("tunefetch_missing_tool_xyz")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = ToolCommand::new("sleep")
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "unexpected: {err}");
    }
}
