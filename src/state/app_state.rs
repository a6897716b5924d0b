//! Main agent state management

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ServiceErrors;
use crate::{config::AgentConfig, homebrew::Homebrew};

/// Shared state of the HTTP agent
pub struct AppState {
    /// Homebrew installation the agent controls
    pub homebrew: Arc<Homebrew>,
    /// Services the keep-alive task keeps started
    pub keep_alive: Vec<String>,
    pub keep_alive_interval: Duration,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
    /// Most recent failure per service
    pub errors: Mutex<ServiceErrors>,
    /// Cancelled on shutdown; kills in-flight commands
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: &AgentConfig, homebrew: Arc<Homebrew>, cancel: CancellationToken) -> Self {
        Self {
            homebrew,
            keep_alive: config.keep_alive.clone(),
            keep_alive_interval: Duration::from_secs(config.keep_alive_interval_secs),
            start_time: Instant::now(),
            port: config.port,
            host: config.host.clone(),
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
            errors: Mutex::new(ServiceErrors::new()),
            cancel,
        }
    }

    /// Remember the most recent action and when it happened
    pub fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Record the outcome of a service operation
    pub fn record_outcome<E: std::fmt::Display>(&self, service: &str, outcome: &Result<(), E>) -> Result<(), String> {
        let mut errors = self.errors.lock()
            .map_err(|e| format!("Failed to lock service errors: {}", e))?;

        match outcome {
            Ok(()) => {
                errors.clear(service);
            }
            Err(e) => {
                warn!("Recording error for {}: {}", service, e);
                errors.record(service, e.to_string());
            }
        }
        Ok(())
    }

    /// Get current per-service errors
    pub fn get_errors(&self) -> Result<BTreeMap<String, String>, String> {
        self.errors.lock()
            .map(|errors| errors.snapshot())
            .map_err(|e| format!("Failed to lock service errors: {}", e))
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed())
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Stop background work and in-flight commands
    pub fn shutdown(&self) {
        info!("Cancelling in-flight commands");
        self.cancel.cancel();
    }
}

fn format_uptime(duration: Duration) -> String {
    let hours = duration.as_secs() / 3600;
    let minutes = (duration.as_secs() % 3600) / 60;
    let seconds = duration.as_secs() % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
