//! API error handling: structured responses with request tracking.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (UNKNOWN_TIER, INSUFFICIENT_FUNDS, …).
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest { code: &'static str, message: String },
    /// Uniform rejection; deliberately carries no detail.
    Unauthorized,
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::bad_request_code(request_id, "BAD_REQUEST", message)
    }

    pub fn bad_request_code(request_id: String, code: &'static str, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest { code, message },
            request_id,
        }
    }

    pub fn unauthorized(request_id: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message),
            request_id,
        }
    }

    pub fn internal(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Internal(message),
            request_id,
        }
    }

    /// Map a domain error onto the wire.
    pub fn from_engine(request_id: String, err: EngineError) -> Self {
        match err {
            EngineError::UnknownTier(tier) => Self::bad_request_code(
                request_id,
                "UNKNOWN_TIER",
                format!("unknown stake tier '{tier}'"),
            ),
            EngineError::InsufficientFunds { balance, required } => Self::bad_request_code(
                request_id,
                "INSUFFICIENT_FUNDS",
                format!("balance {balance} is below the required {required}"),
            ),
            EngineError::Cooldown { remaining_secs } => Self::bad_request_code(
                request_id,
                "COOLDOWN",
                format!("free wager available again in {remaining_secs}s"),
            ),
            EngineError::NotWithdrawable => Self::bad_request_code(
                request_id,
                "NOT_WITHDRAWABLE",
                "fixed-value prizes cannot be withdrawn".into(),
            ),
            EngineError::UnknownPrize(name) => Self::bad_request_code(
                request_id,
                "UNKNOWN_PRIZE",
                format!("prize '{name}' is not in the catalog"),
            ),
            EngineError::CatalogEmpty => Self::service_unavailable(
                request_id,
                "price catalog has no entries yet".into(),
            ),
            EngineError::ItemNotFound => {
                Self::not_found(request_id, "inventory item not found".into())
            }
            EngineError::TaskNotFound => {
                Self::not_found(request_id, "withdrawal task not found".into())
            }
            EngineError::AccountNotFound(id) => {
                Self::not_found(request_id, format!("account {id} not found"))
            }
            other => Self::internal(request_id, other.to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest { code, message } => {
                write!(f, "[{}] {}: {}", self.request_id, code, message)
            }
            ApiErrorKind::Unauthorized => write!(f, "[{}] Unauthorized", self.request_id),
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
            ApiErrorKind::Internal(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), msg),
            ApiErrorKind::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code.to_string(), message)
            }
            ApiErrorKind::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED".to_string(),
                "authentication failed".to_string(),
            ),
            ApiErrorKind::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE".to_string(),
                msg,
            ),
            ApiErrorKind::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                msg,
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code,
                message,
            },
        });

        (status, body).into_response()
    }
}
