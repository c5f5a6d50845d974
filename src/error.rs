use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::teleop::Side;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A second operator tried to connect while a session is active
    #[error("Multiple connection! Wait for last connection is done")]
    Busy,

    /// Unknown channel label or malformed channel payload
    #[error("Protocol violation on channel '{channel}': {reason}")]
    Protocol { channel: String, reason: String },

    #[error("Reset {0} arm first!")]
    NotCalibrated(Side),

    #[error("Connect capture and making sure {0} are in the camera view!")]
    MarkerNotVisible(Side),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Unknown control command: {0}")]
    UnknownCommand(String),

    /// A pending wait observed session teardown
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Video error: {0}")]
    VideoError(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Busy => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Protocol { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the condition clears on its own (marker comes back into view,
    /// calibration completes) and the caller should simply skip this update.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::NotCalibrated(_) | AppError::MarkerNotVisible(_) | AppError::OutOfRange(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::NotCalibrated(Side::Left).is_transient());
        assert!(AppError::MarkerNotVisible(Side::Right).is_transient());
        assert!(AppError::OutOfRange("lift".into()).is_transient());
        assert!(!AppError::Busy.is_transient());
        assert!(!AppError::UnknownCommand("x".into()).is_transient());
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        let response = AppError::Busy.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_operator_facing_messages() {
        assert_eq!(
            AppError::NotCalibrated(Side::Left).to_string(),
            "Reset left arm first!"
        );
        assert_eq!(
            AppError::MarkerNotVisible(Side::Right).to_string(),
            "Connect capture and making sure right are in the camera view!"
        );
    }
}
