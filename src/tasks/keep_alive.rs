//! Keep-alive background task

use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::state::AppState;

/// Periodically re-ensure that every keep-alive service is started.
///
/// Runs until the state's cancellation token fires.
pub async fn keep_alive_task(state: Arc<AppState>) {
    if state.keep_alive.is_empty() {
        info!("No keep-alive services configured");
        return;
    }
    info!(
        "Starting keep-alive task for {:?} every {:?}",
        state.keep_alive, state.keep_alive_interval
    );

    let mut ticker = interval(state.keep_alive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for service in &state.keep_alive {
                    debug!("Keep-alive check for {}", service);
                    let outcome = state.homebrew.ensure_started(service).await;
                    if matches!(&outcome, Err(e) if e.is_cancelled()) {
                        break;
                    }
                    if let Err(e) = state.record_outcome(service, &outcome) {
                        error!("Failed to record keep-alive outcome: {}", e);
                    }
                }
            }
            _ = state.cancel.cancelled() => {
                info!("Keep-alive task stopping");
                return;
            }
        }
    }
}
