//! Last failure per service, surfaced through `/status`

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Most recent error for each service that failed to reach its desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceErrors {
    errors: BTreeMap<String, String>,
}

impl ServiceErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error, replacing the previous one for the same service
    pub fn record(&mut self, service: &str, error: String) {
        self.errors.insert(service.to_string(), error);
    }

    /// Clear the error for a service; returns whether there was one
    pub fn clear(&mut self, service: &str) -> bool {
        let cleared = self.errors.remove(service).is_some();
        if cleared {
            tracing::info!("Cleared error for service: {}", service);
        }
        cleared
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.errors.clone()
    }
}
