use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facegate_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Request failures and the HTTP responses they map to.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("No face detected in photo. Please ensure your face is clearly visible.")]
    NoFaceDetected,
    #[error("User profile not found. Please upload profile photo first.")]
    ProfileNotFound,
    #[error("{message}")]
    StorageFailure {
        message: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("unexpected failure: {0}")]
    UnexpectedFailure(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::NoFaceDetected => StatusCode::BAD_REQUEST,
            ApiError::ProfileNotFound => StatusCode::NOT_FOUND,
            ApiError::StorageFailure { .. } | ApiError::UnexpectedFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Preprocess(e) => ApiError::InvalidInput(format!("Invalid image file: {e}")),
            other => ApiError::UnexpectedFailure(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::StorageFailure { message, source } => {
                tracing::error!(error = %source, "{message}");
                json!({ "error": message })
            }
            ApiError::UnexpectedFailure(detail) => {
                tracing::error!(error = %detail, "request failed unexpectedly");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
