use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::media::AdmissionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            AdmissionError::Empty(_) | AdmissionError::UnsupportedType(_) => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Staging(_) => AppError::Internal(err.to_string()),
            AnalysisError::Upload(_) | AnalysisError::Generation(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::BadGateway(msg) => {
                tracing::error!("Analysis failed: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
