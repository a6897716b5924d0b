//! State management module
//! 
//! This module contains the agent's shared state and its bookkeeping.

pub mod app_state;
pub mod service_errors;

// Re-export main types
pub use app_state::AppState;
pub use service_errors::ServiceErrors;
