//! Error taxonomy and wire error envelope.
//!
//! Every component in the library fails with a typed [`ApiError`]; the
//! transport layer is the only place that turns one into the wire envelope
//! `{status, message, type}` via the [`IntoResponse`] impl.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors surfaced by the validator, session manager and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad input shape, unsupported type/size, or a chunk protocol violation.
    #[error("{0}")]
    Validation(String),

    /// Per-user call or upload-volume quota breach.
    #[error("{0}")]
    RateLimited(String),

    /// Referenced session is unknown (or already reclaimed).
    #[error("{0}")]
    NotFound(String),

    /// Referenced session exists but is in the wrong state for the operation.
    #[error("{0}")]
    State(String),

    /// The vision collaborator failed or returned an unusable result.
    #[error("{0}")]
    Analysis(String),

    /// Authenticated identity does not match the requested `user_id`.
    #[error("{0}")]
    Authorization(String),

    /// Anything unanticipated.
    #[error("{0}")]
    Server(String),
}

impl ApiError {
    /// HTTP status code for this error class.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::State(_) => StatusCode::CONFLICT,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Analysis(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable `type` discriminator used in the wire envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::RateLimited(_) => "RateLimitExceeded",
            Self::NotFound(_) => "NotFoundError",
            Self::State(_) => "StateError",
            Self::Analysis(_) => "AnalysisError",
            Self::Authorization(_) => "AuthorizationError",
            Self::Server(_) => "ServerError",
        }
    }
}

/// Wire error envelope shared by every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// HTTP status code, repeated in the body for event-bus clients.
    pub status: u16,
    /// Human-readable description.
    pub message: String,
    /// Error class discriminator.
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = ErrorEnvelope {
            status: status.as_u16(),
            message: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(envelope)).into_response()
    }
}
