//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exec_lib::{ErrorKind, SessionError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Error returned by request handlers and middleware
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), message = %message, "Request failed");
        } else {
            debug!(status = status.as_u16(), message = %message, "Request rejected");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation | ErrorKind::Resolution => Self::BadRequest(message),
            ErrorKind::Authorization => Self::Unauthorized(message),
            ErrorKind::RemoteExecution | ErrorKind::Internal => Self::Internal(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
