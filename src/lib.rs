//! brewstrap - Homebrew bootstrap and service keeper
//! 
//! This library runs external commands with timeouts and cancellation, drives
//! Homebrew services to a desired status with a bounded retry loop, and
//! provisions podman on top of Homebrew.

pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod homebrew;
pub mod podman;
pub mod provision;
pub mod retry;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use command::{CommandResult, CommandRunner, CommandSpec, SystemRunner};
pub use config::{Config, ProvisionConfig};
pub use error::{CommandError, ProvisionError};
pub use homebrew::{Homebrew, ServiceRecord};
pub use provision::Provisioner;
pub use retry::RetryPolicy;
pub use state::AppState;
pub use api::create_router;
pub use utils::signals::shutdown_signal;
