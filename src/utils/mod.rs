//! Process-level helpers for the agent

pub mod signals;

pub use signals::shutdown_signal;
