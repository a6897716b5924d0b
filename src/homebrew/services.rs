//! Homebrew service management: status snapshots and the start/stop poller

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{validate_name, Homebrew};
use crate::error::{ProvisionError, Result};

/// Status reported by `brew services list` for a running service
pub const STATUS_STARTED: &str = "started";

/// Column label that marks the header row of `brew services list`
const HEADER_LABEL: &str = "Name";

/// One row of a status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub status: String,
    pub user: Option<String>,
    /// Launchd plist or systemd unit backing the service
    pub file: Option<String>,
}

/// Parse `brew services list` output into records, in output order.
///
/// Everything up to the first `Name` label is ignored; output without it
/// yields no records. Rows are split on whitespace: three fields are
/// `Name Status File`, four are `Name Status User File`. Any other row is
/// skipped: stopped services (`podman none`) and errored launchd services,
/// which carry an extra exit code column
/// (`redis error  256 root ~/Library/LaunchAgents/homebrew.mxcl.redis.plist`),
/// do not appear in the result.
pub fn parse_service_list(output: &str) -> Vec<ServiceRecord> {
    let Some(idx) = output.find(HEADER_LABEL) else {
        return Vec::new();
    };

    output[idx..]
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, status, file] => Some(ServiceRecord {
                    name: name.to_string(),
                    status: status.to_string(),
                    user: None,
                    file: Some(file.to_string()),
                }),
                [name, status, user, file] => Some(ServiceRecord {
                    name: name.to_string(),
                    status: status.to_string(),
                    user: Some(user.to_string()),
                    file: Some(file.to_string()),
                }),
                _ => None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceAction {
    Start,
    Stop,
}

impl ServiceAction {
    fn verb(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
        }
    }

    fn desired_label(self) -> &'static str {
        match self {
            ServiceAction::Start => STATUS_STARTED,
            ServiceAction::Stop => "stopped",
        }
    }
}

impl Homebrew {
    /// Take a fresh status snapshot
    pub async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        let result = self.run_checked(self.brew(["services", "list"])).await?;
        let services = parse_service_list(&result.stdout);
        debug!("Listed {} services", services.len());
        Ok(services)
    }

    /// Whether `name` currently reports exactly `status`
    pub async fn check_status(&self, name: &str, status: &str) -> Result<bool> {
        let services = self.list_services().await?;
        Ok(services
            .iter()
            .any(|service| service.name == name && service.status == status))
    }

    /// Start a service and poll until it reports `started`
    pub async fn ensure_started(&self, name: &str) -> Result<()> {
        self.ensure_status(name, ServiceAction::Start).await
    }

    /// Stop a service and poll until it no longer reports `started`
    pub async fn ensure_stopped(&self, name: &str) -> Result<()> {
        self.ensure_status(name, ServiceAction::Stop).await
    }

    async fn ensure_status(&self, name: &str, action: ServiceAction) -> Result<()> {
        validate_name(name)?;
        let desired = action.desired_label();
        let mut last_error: Option<String> = None;

        if self.poll_status(name, action, &mut last_error).await? {
            info!("{} is already {}, no action needed", name, desired);
            return Ok(());
        }

        debug!("Attempting to {} {}", action.verb(), name);
        self.issue(name, action).await?;

        let budget = self.retry.max_attempts;
        for attempt in 0..budget {
            self.pause(self.retry.delay(attempt), name).await?;

            if self.poll_status(name, action, &mut last_error).await? {
                info!("{} {} successfully", name, desired);
                return Ok(());
            }

            debug!(
                "{} not {} yet, retrying {} ({} of {})",
                name,
                desired,
                action.verb(),
                attempt + 1,
                budget
            );
            if let Err(e) = self.issue(name, action).await {
                if e.is_cancelled() {
                    return Err(e);
                }
                warn!("brew services {} {} failed: {}", action.verb(), name, e);
                last_error = Some(e.to_string());
            }
        }

        Err(ProvisionError::RetryBudgetExhausted {
            service: name.to_string(),
            attempts: budget,
            last_error,
        })
    }

    /// Whether the service has reached the state `action` aims for.
    ///
    /// Listing failures count as "not reached" and are remembered in `last_error`.
    async fn poll_status(
        &self,
        name: &str,
        action: ServiceAction,
        last_error: &mut Option<String>,
    ) -> Result<bool> {
        match self.check_status(name, STATUS_STARTED).await {
            // Stopped services print no user or file column, so they are
            // recognised by the absence of a `started` row
            Ok(started) => Ok(match action {
                ServiceAction::Start => started,
                ServiceAction::Stop => !started,
            }),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Failed to list services: {}", e);
                *last_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    async fn issue(&self, name: &str, action: ServiceAction) -> Result<()> {
        let result = self
            .run_checked(self.brew(["services", action.verb(), name]))
            .await?;
        if !result.stdout.trim().is_empty() {
            debug!("{}", result.stdout.trim());
        }
        Ok(())
    }
}
