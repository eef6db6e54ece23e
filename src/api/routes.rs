use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Model endpoints
        .route(
            "/train_deep_hybrid_model",
            post(handlers::train_deep_hybrid_model),
        )
        .route("/validate_model", post(handlers::validate_model))
        .route("/predict_best_model", post(handlers::predict_best_model))
        // Probe endpoints
        .route("/healthz", get(handlers::liveness_handler))
        .route("/livez", get(handlers::liveness_handler))
        .route("/readyz", get(handlers::readiness_handler))
        // System endpoints
        .route("/status", get(handlers::get_status))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
