// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::error::ErrorKind;
use std::fmt;
use thiserror::Error;

/// Failures of the assessment engine itself.
///
/// Grading never produces one of these: malformed answers are scored as incorrect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuizError {
    #[error("not entitled to take this quiz")]
    NotEntitled,

    #[error("no attempts left ({max_attempts} allowed)")]
    AttemptsExhausted { max_attempts: i64 },

    #[error("question {0} does not belong to this quiz")]
    UnknownQuestion(i64),

    #[error("attempt has already been submitted")]
    AlreadySubmitted,

    #[error("quiz {0} not found")]
    QuizNotFound(i64),

    #[error("attempt {attempt_number} of quiz {quiz_id} not found")]
    AttemptNotFound { quiz_id: i64, attempt_number: i64 },

    #[error("attempt is not in progress")]
    NotInProgress,

    #[error("question {id} is malformed: {reason}")]
    InvalidQuestion { id: i64, reason: String },

    /// Raised only when the attempt-number retry budget runs out.
    #[error("could not claim an attempt number after {0} tries")]
    PersistenceConflict(u32),

    #[error("storage unavailable: {0}")]
    PersistenceFailure(String),

    /// The store refused the row itself; writing it again cannot succeed.
    #[error("record rejected by storage: {0}")]
    RecordRejected(String),
}

impl From<sqlx::Error> for QuizError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if !matches!(db.kind(), ErrorKind::Other) => {
                QuizError::RecordRejected(db.message().to_string())
            }
            _ => QuizError::PersistenceFailure(err.to_string()),
        }
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable (retryable)
    Unavailable(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., attempt already submitted)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        let msg = err.to_string();
        match err {
            QuizError::NotEntitled | QuizError::AttemptsExhausted { .. } => AppError::Forbidden(msg),
            QuizError::UnknownQuestion(_) => AppError::BadRequest(msg),
            QuizError::AlreadySubmitted | QuizError::NotInProgress => AppError::Conflict(msg),
            QuizError::QuizNotFound(_) | QuizError::AttemptNotFound { .. } => {
                AppError::NotFound(msg)
            }
            QuizError::PersistenceFailure(_) => AppError::Unavailable(msg),
            QuizError::InvalidQuestion { .. }
            | QuizError::PersistenceConflict(_)
            | QuizError::RecordRejected(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
