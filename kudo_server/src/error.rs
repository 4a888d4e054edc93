//! Structured error types for the Kudo REST API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use kudo_core::EngageError;

/// Structured API error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Application-level error that converts into an HTTP response.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "SUBJECT_NOT_FOUND".into(),
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_INPUT".into(),
            message: msg.into(),
        }
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHENTICATED".into(),
            message: msg.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".into(),
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "ENGAGEMENT_UNAVAILABLE".into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".into(),
            message: msg.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = axum::Json(ApiError {
            code: self.code,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Map the engine's failure taxonomy onto stable HTTP error kinds.
impl From<EngageError> for AppError {
    fn from(err: EngageError) -> Self {
        match &err {
            EngageError::Unauthenticated => AppError::unauthenticated(err.to_string()),
            EngageError::SubjectNotFound(_) => AppError::not_found(err.to_string()),
            EngageError::InvalidIdentifier(_) | EngageError::EmptyBatch => {
                AppError::bad_request(err.to_string())
            }
            EngageError::Unavailable(source) => {
                tracing::error!(error = %source, "engagement store unavailable");
                AppError::unavailable(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
