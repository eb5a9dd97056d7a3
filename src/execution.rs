use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as ProcessCommand;
use tokio_util::sync::CancellationToken;

use crate::error_handling::SessionExit;

/// Captured result of one shell command
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// stdout followed by stderr
    pub output: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Description of a failed run; the output is still worth forwarding
    pub fn error_message(&self) -> Option<String> {
        match self.exit_code {
            Some(0) => None,
            Some(code) => Some(format!("exit status {}", code)),
            None => Some("terminated by signal".to_string()),
        }
    }
}

/// Runs an approved command
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// An `Err` means the command could not be started or was interrupted.
    /// A non-zero exit is an `Ok` result with `error_message()` set.
    async fn execute(&self, command: &str, cancel: &CancellationToken) -> Result<ExecutionResult>;
}

/// `sh -c <command>` with stdin detached and output captured
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

#[async_trait]
impl ShellRunner for SystemShell {
    async fn execute(&self, command: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let started = Instant::now();
        let child = ProcessCommand::new("sh")
            .args(["-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn sh")?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(SessionExit::Abort.into()),
            output = child.wait_with_output() => output.context("failed to execute command")?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecutionResult {
            output: combined,
            exit_code: output.status.code(),
            duration: started.elapsed(),
        })
    }
}
