use axum::{body::Bytes, extract::State, Json};

use crate::api::{
    state::AppState,
    types::{parse_body, ApiError},
};
use crate::control::{FinishedResponse, TrainRequest, TrainResponse, ValidateRequest};

/// POST /train_deep_hybrid_model
pub async fn train_deep_hybrid_model(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TrainResponse>, ApiError> {
    let request: TrainRequest = parse_body(&body)?;
    Ok(Json(state.control.train(request).await))
}

/// POST /validate_model
pub async fn validate_model(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FinishedResponse>, ApiError> {
    let request: ValidateRequest = parse_body(&body)?;
    Ok(Json(state.control.validate(request).await))
}

/// POST /predict_best_model
///
/// Any request body is ignored.
pub async fn predict_best_model(State(state): State<AppState>) -> Json<FinishedResponse> {
    Json(state.control.predict().await)
}
