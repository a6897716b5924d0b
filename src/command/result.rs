//! Structured outcome of a command invocation

use std::time::Duration;
use tracing::warn;

use crate::error::ProvisionError;

/// Which stream content the caller treats as failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrPolicy {
    /// Only an unsuccessful exit is a failure; stderr text is advisory
    #[default]
    ExitStatus,
    /// Any stderr output is a failure as well, even with exit code 0
    Strict,
}

/// Captured output and exit condition of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Stdout went to the terminal and is not available in `stdout`
    pub stdout_streamed: bool,
    pub elapsed: Duration,
}

impl CommandResult {
    /// Build a result for a process that exited with `exit_code`
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            success: exit_code == 0,
            stdout_streamed: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Describes the exit condition when the process did not exit successfully
    pub fn exit_error(&self) -> Option<String> {
        if self.success {
            return None;
        }
        Some(match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        })
    }

    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }

    /// Whether this result is a failure under `policy`
    pub fn is_failure(&self, policy: StderrPolicy) -> bool {
        match policy {
            StderrPolicy::ExitStatus => !self.success,
            StderrPolicy::Strict => !self.success || self.has_stderr(),
        }
    }

    /// Turn the result into an error when it is a failure under `policy`.
    ///
    /// Advisory stderr output on an otherwise successful run is logged.
    pub fn check(self, command: &str, policy: StderrPolicy) -> Result<Self, ProvisionError> {
        if self.is_failure(policy) {
            return Err(ProvisionError::Failed {
                command: command.to_string(),
                exit: self
                    .exit_error()
                    .unwrap_or_else(|| "exit status 0 with stderr output".to_string()),
                stderr: self.stderr.trim().to_string(),
            });
        }
        if self.has_stderr() {
            warn!("'{}' wrote to stderr: {}", command, self.stderr.trim());
        }
        Ok(self)
    }
}
