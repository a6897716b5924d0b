//! External command execution
//!
//! Every interaction with the package manager, the service manager and the
//! install scripts goes through a [`CommandRunner`]. Runners never treat a
//! non-zero exit as an error: the outcome is reported in [`CommandResult`] and
//! the caller decides what counts as failure.

pub mod result;
pub mod system;

#[cfg(test)]
pub(crate) mod scripted;

use std::{fmt, path::PathBuf};
use async_trait::async_trait;

use crate::error::CommandError;

pub use result::{CommandResult, StderrPolicy};
pub use system::SystemRunner;

/// Where the child's standard output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture stdout into the result for parsing
    #[default]
    Capture,
    /// Forward stdout live to our own stdout (long running, user facing commands)
    Stream,
}

/// A single external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set only for this child process
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub output: OutputMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            output: OutputMode::Capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variables to the child's environment overlay
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Stream stdout to the terminal instead of capturing it
    pub fn streamed(mut self) -> Self {
        self.output = OutputMode::Stream;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            // Install scripts are passed inline to `bash -c`, keep logs readable
            if arg.contains('\n') {
                write!(f, " <script>")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes external programs.
///
/// Implementations must return `Err` only when the program could not be run
/// to completion (spawn failure, timeout, cancellation).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError>;
}
