use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ride::RideStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ride {0} is no longer available")]
    RideUnavailable(Uuid),

    #[error("cannot move ride from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not signed in")]
    Unauthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable label used for log fields and metric outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::RideUnavailable(_) => "race_lost",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthenticated => "unauthenticated",
            AppError::NotFound(_) => "not_found",
            AppError::Backend(_) => "backend",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RideUnavailable(_) | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            AppError::Backend(_) => tracing::warn!(error = %self, kind = self.kind(), "request failed"),
            AppError::Internal(_) => tracing::error!(error = %self, kind = self.kind(), "request failed"),
            _ => {}
        }

        // Backend details stay in the logs; the caller gets a generic message.
        let message = match &self {
            AppError::Backend(_) => "backend request failed, try again".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
