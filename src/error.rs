//! Failure taxonomy for calls against the inference backend.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Longest slice of a backend error body carried back to the caller.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The backend could not be reached, or the connection broke.
    #[error("Failed to connect to Ollama: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("Request to Ollama timed out")]
    UpstreamTimeout,

    /// Non-success status from the backend; `body` is already truncated.
    #[error("Ollama request failed: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Malformed response from Ollama: {reason}")]
    MalformedUpstreamResponse { reason: String },
}

impl ProxyError {
    /// Classify a reqwest transport failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout
        } else {
            ProxyError::UpstreamUnavailable {
                reason: err.to_string(),
            }
        }
    }

    pub fn upstream(status: u16, body: &str) -> Self {
        ProxyError::UpstreamError {
            status,
            body: truncate_body(body),
        }
    }
}

/// Keep at most [`MAX_ERROR_BODY_CHARS`] characters of `body`.
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::MalformedUpstreamResponse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
