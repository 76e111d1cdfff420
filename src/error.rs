//! # Error Handling
//!
//! Defines the caller-facing error taxonomy and how each variant is converted
//! to an HTTP response. Every fallible step of a request maps to exactly one
//! of these variants, so handlers can use `?` all the way down and still emit
//! a structured `{"error": "..."}` body instead of an unhandled fault.
//!
//! ## Error Categories:
//! - **Input**: no usable audio source was supplied (400)
//! - **Decode**: audio bytes could not be parsed or normalized (400)
//! - **Fetch**: a remote audio URL was unreachable or returned non-success (400)
//! - **ModelNotFound**: the requested model name is not in the registry (404)
//! - **Inference**: the underlying model raised during transcription (500)
//! - **Internal**: anything else server-side (500)
//!
//! Model *load* failures are deliberately absent here: they are contained
//! entirely within registry construction (logged and skipped) and never reach
//! a caller.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Caller-facing error type for the transcription API.
///
/// ## Propagation policy:
/// Errors terminate only the request (single-shot) or the single message
/// (streaming) that triggered them. The WebSocket session loop converts these
/// into per-message `{"error": ...}` frames and keeps the connection open.
#[derive(Debug)]
pub enum ApiError {
    /// No audio source of any kind was provided with the request
    Input(String),

    /// Audio bytes could not be decoded into canonical samples
    Decode(String),

    /// Remote audio source could not be fetched
    Fetch(String),

    /// Requested model name is absent from the registry
    ModelNotFound(String),

    /// The model capability failed during transcription
    Inference(String),

    /// Unexpected server-side failure (task join errors, etc.)
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Input(msg) => write!(f, "{}", msg),
            ApiError::Decode(msg) => write!(f, "Audio decode error: {}", msg),
            ApiError::Fetch(msg) => write!(f, "Audio fetch error: {}", msg),
            ApiError::ModelNotFound(name) => write!(f, "Model '{}' not loaded.", name),
            ApiError::Inference(msg) => write!(f, "Transcription failed: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Converts each error variant into the flat `{"error": "..."}` JSON body the
/// wire protocol promises, with the matching HTTP status code.
impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let status = match self {
            ApiError::Input(_) | ApiError::Decode(_) | ApiError::Fetch(_) => {
                actix_web::http::StatusCode::BAD_REQUEST
            }
            ApiError::ModelNotFound(_) => actix_web::http::StatusCode::NOT_FOUND,
            ApiError::Inference(_) | ApiError::Internal(_) => {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

/// Task join failures (panicked blocking workers) surface as internal errors.
impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {}", err))
    }
}

/// Type alias for Results that use the API error type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (
                ApiError::Input("no audio".into()),
                actix_web::http::StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Decode("bad bytes".into()),
                actix_web::http::StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::ModelNotFound("large".into()),
                actix_web::http::StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Inference("boom".into()),
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.error_response().status(), expected);
        }
    }

    #[test]
    fn test_model_not_found_message() {
        // The message format is part of the wire contract and mirrored by the
        // streaming path.
        let err = ApiError::ModelNotFound("large".into());
        assert_eq!(err.to_string(), "Model 'large' not loaded.");
    }
}
