//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use tracing::{error, info};

use crate::{error::ProvisionError, homebrew::validate_name, state::AppState};
use super::responses::{ApiResponse, HealthResponse, ServicesResponse, StatusResponse};

type ApiError = (StatusCode, Json<ApiResponse>);

/// Handle GET /services - Return a fresh status snapshot
pub async fn list_services_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ServicesResponse>, ApiError> {
    match state.homebrew.list_services().await {
        Ok(services) => Ok(Json(ServicesResponse {
            services,
            timestamp: Utc::now(),
        })),
        Err(e) => {
            error!("Failed to list services: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::error("*", e.to_string())),
            ))
        }
    }
}

/// Handle POST /services/:name/start - Start a service and wait until it is started
pub async fn service_start_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    check_name(&name)?;
    state.record_action(&format!("start {}", name));
    let outcome = state.homebrew.ensure_started(&name).await;
    respond(&state, &name, "started", outcome)
}

/// Handle POST /services/:name/stop - Stop a service and wait until it is stopped
pub async fn service_stop_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    check_name(&name)?;
    state.record_action(&format!("stop {}", name));
    let outcome = state.homebrew.ensure_stopped(&name).await;
    respond(&state, &name, "stopped", outcome)
}

/// Refuse names `brew` would treat as options before anything runs
fn check_name(name: &str) -> Result<(), ApiError> {
    validate_name(name).map_err(|e| {
        error!("Rejected service name: {}", e);
        (StatusCode::BAD_REQUEST, Json(ApiResponse::error(name, e.to_string())))
    })
}

fn status_for(error: &ProvisionError) -> StatusCode {
    match error {
        ProvisionError::InvalidName(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn respond(
    state: &AppState,
    name: &str,
    done: &str,
    outcome: crate::error::Result<()>,
) -> Result<Json<ApiResponse>, ApiError> {
    if let Err(e) = state.record_outcome(name, &outcome) {
        error!("Failed to record outcome for {}: {}", name, e);
    }

    match outcome {
        Ok(()) => {
            info!("{} {} via API", name, done);
            Ok(Json(ApiResponse::ok(name, format!("{} {}", name, done))))
        }
        Err(e) => {
            error!("Failed to reach {} for {}: {}", done, name, e);
            Err((status_for(&e), Json(ApiResponse::error(name, e.to_string()))))
        }
    }
}

/// Handle GET /status - Return agent status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, StatusCode> {
    let errors = match state.get_errors() {
        Ok(errors) => errors,
        Err(e) => {
            error!("Failed to get service errors: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        keep_alive: state.keep_alive.clone(),
        keep_alive_interval_secs: state.keep_alive_interval.as_secs(),
        errors,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
