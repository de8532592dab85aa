use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;
use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Access token has expired")]
    TokenExpired,

    #[error("Access token is malformed")]
    TokenMalformed,

    #[error("Access token type mismatch: expected {expected}, got {actual}")]
    TokenTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Access token integrity check failed")]
    TokenTagMismatch,

    #[error("Order window has not started yet")]
    WindowNotStarted { minutes_until_start: i64 },

    #[error("Order window has ended")]
    WindowClosed { minutes_since_close: i64 },

    #[error("An order for this project already exists today")]
    DuplicateOrder { existing_order_id: Option<Uuid> },

    #[error("Invalid exception type {0}")]
    InvalidExceptionType(String),

    #[error("Exception quota already used")]
    ExceptionQuotaExhausted { next_available_at: DateTime<Utc> },

    #[error("Invalid order status {0}")]
    InvalidStatus(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not Found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Delivered orders cannot be cancelled")]
    AlreadyDelivered,

    #[error("Project is inactive")]
    ProjectInactive,

    #[error("Amount exceeds the supported range")]
    AmountOverflow,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::TokenMalformed => "TOKEN_MALFORMED",
            AppError::TokenTypeMismatch { .. } => "TOKEN_TYPE_MISMATCH",
            AppError::TokenTagMismatch => "TOKEN_TAG_MISMATCH",
            AppError::WindowNotStarted { .. } => "WINDOW_NOT_STARTED",
            AppError::WindowClosed { .. } => "WINDOW_CLOSED",
            AppError::DuplicateOrder { .. } => "DUPLICATE_ORDER",
            AppError::InvalidExceptionType(_) => "INVALID_EXCEPTION_TYPE",
            AppError::ExceptionQuotaExhausted { .. } => "EXCEPTION_QUOTA_EXHAUSTED",
            AppError::InvalidStatus(_) => "INVALID_STATUS",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::NotFound => "NOT_FOUND",
            AppError::Forbidden => "FORBIDDEN",
            AppError::AlreadyDelivered => "ALREADY_DELIVERED",
            AppError::ProjectInactive => "PROJECT_INACTIVE",
            AppError::AmountOverflow => "AMOUNT_OVERFLOW",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::DbError(_) | AppError::OrmError(_) => "STORE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::TokenExpired
            | AppError::TokenMalformed
            | AppError::TokenTypeMismatch { .. }
            | AppError::TokenTagMismatch
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::WindowNotStarted { .. }
            | AppError::WindowClosed { .. }
            | AppError::Forbidden
            | AppError::ExceptionQuotaExhausted { .. }
            | AppError::ProjectInactive => StatusCode::FORBIDDEN,
            AppError::DuplicateOrder { .. }
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyDelivered => StatusCode::CONFLICT,
            AppError::InvalidExceptionType(_)
            | AppError::InvalidStatus(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AmountOverflow => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DbError(_) | AppError::OrmError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::TokenTypeMismatch { expected, actual } => {
                Some(serde_json::json!({ "expected": expected, "actual": actual }))
            }
            AppError::WindowNotStarted {
                minutes_until_start,
            } => Some(serde_json::json!({ "startsIn": minutes_until_start })),
            AppError::WindowClosed {
                minutes_since_close,
            } => Some(serde_json::json!({ "minutesAgo": minutes_since_close })),
            AppError::DuplicateOrder { existing_order_id } => {
                Some(serde_json::json!({ "existingOrderId": existing_order_id }))
            }
            AppError::ExceptionQuotaExhausted { next_available_at } => {
                Some(serde_json::json!({ "nextAvailableAt": next_available_at }))
            }
            AppError::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database failure"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm failure"),
            AppError::Internal(err) => tracing::error!(error = %err, "internal failure"),
            _ => tracing::debug!(code = self.code(), "request rejected"),
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                code: self.code(),
                error: self.to_string(),
                details: self.details(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
