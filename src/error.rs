//! Error types shared by the command runner, the Homebrew facade and podman provisioning

use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Failures of the command runner itself.
///
/// A process that starts and exits unsuccessfully is *not* an error here; that
/// outcome is reported inside [`crate::command::CommandResult`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' timed out after {timeout:?} and was killed")]
    Timeout { command: String, timeout: Duration },
    #[error("'{command}' was cancelled")]
    Cancelled { command: String },
    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while provisioning Homebrew, its services and podman.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("'{command}' failed ({exit}): {stderr}")]
    Failed {
        command: String,
        exit: String,
        stderr: String,
    },
    #[error("service {service} did not reach the desired status after {attempts} attempts{}", last_error_suffix(.last_error))]
    RetryBudgetExhausted {
        service: String,
        attempts: u32,
        last_error: Option<String>,
    },
    #[error("unexpected output from '{command}': {reason}")]
    Parse { command: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("podman socket {} did not appear", .0.display())]
    SocketMissing(PathBuf),
    #[error("package {0} is not installed")]
    NotInstalled(String),
    #[error("invalid formula or service name '{0}'")]
    InvalidName(String),
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(", last error: {}", e),
        None => String::new(),
    }
}

impl ProvisionError {
    /// The shared cancellation token fired while a command was running
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProvisionError::Command(CommandError::Cancelled { .. }))
    }

    /// The caller supplied a name `brew` must not see
    pub fn is_invalid_name(&self) -> bool {
        matches!(self, ProvisionError::InvalidName(_))
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
