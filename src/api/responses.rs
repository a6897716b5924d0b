//! API response structures

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::homebrew::ServiceRecord;

/// API response structure for service control endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub service: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: &str, service: &str, message: String) -> Self {
        Self {
            status: status.to_string(),
            service: service.to_string(),
            message,
            timestamp: Utc::now(),
        }
    }

    /// Create a success response
    pub fn ok(service: &str, message: String) -> Self {
        Self::new("ok", service, message)
    }

    /// Create an error response
    pub fn error(service: &str, message: String) -> Self {
        Self::new("error", service, message)
    }
}

/// Status snapshot returned by GET /services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: Vec<ServiceRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Agent status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub keep_alive: Vec<String>,
    pub keep_alive_interval_secs: u64,
    pub errors: BTreeMap<String, String>,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
