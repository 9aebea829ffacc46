//! Relay errors, plus the unified API error type: every 4xx/5xx response is
//! JSON with a consistent shape.
//!
//! ```json
//! { "code": "not_yet_fulfilled", "message": "request 1: no response yet" }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use oracle_adapter::DispatchError;
use oracle_ledger::{LedgerError, RequestId};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("ledger write failed for request {request_id} after {attempts} attempt(s): {reason}")]
    LedgerWrite {
        request_id: RequestId,
        attempts: u32,
        reason: String,
    },

    #[error("request {0} already fulfilled")]
    AlreadyFulfilled(RequestId),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("dispatcher: {0}")]
    Dispatcher(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{resource} not found"))
    }

    pub fn conflict(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, msg)
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            "content-type must be application/json",
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::UnknownRequest(id) => Self::not_found(&format!("request {id}")),
            LedgerError::NotYetFulfilled(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_yet_fulfilled", e.to_string())
            }
            LedgerError::AlreadyFulfilled(_) => Self::conflict("already_fulfilled", e.to_string()),
            LedgerError::BadNonce { .. } => Self::conflict("bad_nonce", e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for AppError {}
