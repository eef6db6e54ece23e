use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Client-side request errors
///
/// Script failures never end up here; they are reported inside a normal response.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Decode an optional JSON body
///
/// An empty body or `null` means "use every default". The content type is not checked.
pub fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let parsed: Option<T> = serde_json::from_slice(body)?;
    Ok(parsed.unwrap_or_default())
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub training_in_progress: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_activity_epoch: Option<f64>,
    pub idle_minutes: Option<f64>,
    pub idle_threshold_minutes: Option<u64>,
    pub watchdog_state: String,
    pub uptime_seconds: i64,
    pub version: String,
}

/// Convert a marker timestamp into a calendar time
pub fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1_000_000_000.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos.min(999_999_999)).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{TrainRequest, ValidateRequest};

    #[test]
    fn test_empty_body_means_defaults() {
        let request: TrainRequest = parse_body(&Bytes::from_static(b"")).unwrap();
        assert!(request.n_neighbors.is_none());

        let request: ValidateRequest = parse_body(&Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(request.test_user_count(), 100);

        let request: ValidateRequest = parse_body(&Bytes::from_static(b"null")).unwrap();
        assert_eq!(request.test_user_count(), 100);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let request: ValidateRequest =
            parse_body(&Bytes::from_static(br#"{"test_user_count": 50, "extra": true}"#))
                .unwrap();
        assert_eq!(request.test_user_count(), 50);
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let result: Result<TrainRequest, _> =
            parse_body(&Bytes::from_static(br#"{"epochs": "many"}"#));
        assert!(matches!(result, Err(ApiError::InvalidBody(_))));

        let result: Result<TrainRequest, _> = parse_body(&Bytes::from_static(b"{not json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_epoch_to_datetime() {
        let dt = epoch_to_datetime(1_700_000_000.5).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(epoch_to_datetime(f64::NAN).is_none());
    }
}
