//! Runner backed by real child processes

use std::{
    process::Stdio,
    time::{Duration, Instant},
};
use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CommandResult, CommandRunner, CommandSpec, OutputMode};
use crate::error::CommandError;

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(900);

/// Spawns programs with tokio, bounded by a timeout and a cancellation token.
///
/// The child is killed when the timeout elapses or the token is cancelled.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
    cancel: CancellationToken,
}

impl SystemRunner {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT, CancellationToken::new())
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError> {
        let command = spec.to_string();
        debug!("Running {}", command);

        if self.cancel.is_cancelled() {
            return Err(CommandError::Cancelled { command });
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match spec.output {
            OutputMode::Capture => cmd.stdout(Stdio::piped()),
            OutputMode::Stream => cmd.stdout(Stdio::inherit()),
        };
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            waited = timeout(self.timeout, child.wait_with_output()) => match waited {
                Ok(output) => output.map_err(|source| CommandError::Io {
                    command: command.clone(),
                    source,
                })?,
                Err(_) => {
                    warn!("{} exceeded {:?}, killing it", command, self.timeout);
                    return Err(CommandError::Timeout { command, timeout: self.timeout });
                }
            },
            _ = self.cancel.cancelled() => {
                warn!("{} cancelled, killing it", command);
                return Err(CommandError::Cancelled { command });
            }
        };

        let result = CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout_streamed: spec.output == OutputMode::Stream,
            elapsed: started.elapsed(),
        };
        debug!(
            "{} finished in {:?} (exit code: {})",
            command,
            result.elapsed,
            result.exit_code.unwrap_or(-1)
        );
        Ok(result)
    }
}
