//! API Error Handling
//!
//! Maps [`VoidError`] onto HTTP statuses with a flat JSON body that always carries
//! the request id. Internal failures are logged here and never returned raw.

use crate::{
    errors::{StorageError, VoidError},
    ledger::models::subject_prefix,
    limits::DenialReason,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stable policy code (`personal_cooldown`, `duplicate_transaction`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<String>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, request_id: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: code.to_string(),
                message: None,
                reason: None,
                retry_hint: None,
                request_id: request_id.to_string(),
            },
        }
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }

    fn reason(mut self, reason: &str) -> Self {
        self.body.reason = Some(reason.to_string());
        self
    }

    pub fn bad_request(request_id: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", request_id).message(message)
    }

    pub fn unauthorized(request_id: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", request_id)
    }

    /// Map a service error. `operation` and `subject` only feed the log line.
    pub fn from_error(request_id: &str, operation: &str, subject: Option<&str>, err: VoidError) -> Self {
        let subject = subject.map(subject_prefix).unwrap_or("-");
        match err {
            VoidError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", request_id).message(format!("{} not found", what))
            }
            VoidError::Validation(msg) => Self::bad_request(request_id, msg),
            VoidError::ValueOutOfRange { .. } => Self::bad_request(request_id, err.to_string()),
            VoidError::InsufficientBalance { .. } => Self::bad_request(request_id, err.to_string())
                .reason(DenialReason::InsufficientBalance.code()),
            VoidError::Denied(denial) => {
                let status = match denial.reason {
                    DenialReason::InsufficientBalance => StatusCode::BAD_REQUEST,
                    _ => StatusCode::TOO_MANY_REQUESTS,
                };
                let mut api = Self::new(status, "DENIED", request_id)
                    .message(denial.message())
                    .reason(denial.reason.code());
                api.body.retry_hint = denial.retry_hint(Utc::now());
                api
            }
            VoidError::AccountSuspended => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", request_id)
                .message("Account suspended")
                .reason("account_suspended"),
            VoidError::DuplicateTransaction(_) => Self::bad_request(request_id, "Transaction already processed")
                .reason("duplicate_transaction"),
            VoidError::MissionAlreadyClaimed(_) => {
                Self::bad_request(request_id, err.to_string()).reason("mission_already_claimed")
            }
            VoidError::MissionIncomplete { .. } => {
                Self::bad_request(request_id, err.to_string()).reason("mission_incomplete")
            }
            VoidError::VoteLimitReached { .. } => {
                Self::bad_request(request_id, "Maximum votes reached").reason("vote_limit_reached")
            }
            VoidError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", request_id).message(err.to_string())
            }
            VoidError::Storage(StorageError::Busy(ref detail)) => {
                warn!(request_id, operation, subject, detail = %detail, "storage busy");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", request_id)
                    .message("Service busy, retry shortly")
            }
            VoidError::Payout(ref e) => {
                warn!(request_id, operation, subject, error = %e, "payment rail failure");
                Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", request_id).message("Payment rail unavailable")
            }
            VoidError::Storage(_) | VoidError::Configuration(_) | VoidError::TaskFailed(_) => {
                error!(request_id, operation, subject, error = %err, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", request_id)
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.body.request_id, self.status, self.body.error)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
