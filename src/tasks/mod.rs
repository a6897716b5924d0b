//! Background tasks module
//! 
//! This module contains background tasks that run alongside the HTTP server.

pub mod keep_alive;

// Re-export main functions
pub use keep_alive::keep_alive_task;
