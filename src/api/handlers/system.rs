use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::api::{
    state::AppState,
    types::{epoch_to_datetime, StatusResponse},
};
use crate::supervisor::WatchdogState;

/// GET /healthz, /livez
pub async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /readyz
///
/// Unavailable once the watchdog has asked the process to exit.
pub async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.watchdog_state() {
        Some(WatchdogState::Terminating) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// GET /status
///
/// Reads the marker without touching it, so polling this does not keep the service alive.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let tracker = state.control.tracker();
    let last_activity_epoch = tracker.last_activity_time();

    Json(StatusResponse {
        training_in_progress: state.control.guard().is_held(),
        last_activity: last_activity_epoch.and_then(epoch_to_datetime),
        last_activity_epoch,
        idle_minutes: tracker.idle_minutes(),
        idle_threshold_minutes: state
            .watchdog
            .as_ref()
            .map(|w| w.config().idle_threshold_minutes),
        watchdog_state: state
            .watchdog_state()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "disabled".to_string()),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
