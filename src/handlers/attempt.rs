// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::attempt::{RecordAnswerRequest, SubmitAttemptRequest},
    quiz::{AttemptKey, AttemptService},
    utils::jwt::Claims,
};

fn attempt_key(claims: &Claims, quiz_id: i64, attempt_number: i64) -> Result<AttemptKey, AppError> {
    Ok(AttemptKey {
        user_id: claims.user_id()?,
        quiz_id,
        attempt_number,
    })
}

/// Starts a new attempt at a quiz.
///
/// * Checks the caller's entitlement to the quiz's course.
/// * Fails with 403 once every allowed attempt has been used.
/// * Returns the questions without their answer keys.
pub async fn start_attempt(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let started = attempts.start(user_id, quiz_id).await?;

    Ok((StatusCode::CREATED, Json(started)))
}

/// Lists the caller's recorded attempts at a quiz.
pub async fn list_attempts(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let history = attempts.history(user_id, quiz_id).await?;

    Ok(Json(history))
}

/// Live state of a running attempt, or the record of a finished one.
pub async fn get_attempt(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, attempt_number)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let key = attempt_key(&claims, quiz_id, attempt_number)?;
    let status = attempts.status(key).await?;

    Ok(Json(status))
}

pub async fn record_answer(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, attempt_number, question_id)): Path<(i64, i64, i64)>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = attempt_key(&claims, quiz_id, attempt_number)?;
    attempts.record_answer(key, question_id, req.answer).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Submits an attempt and returns the graded result.
///
/// The response is sent only after the result has been recorded; a 503 means
/// the same submit can be retried.
pub async fn submit_attempt(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, attempt_number)): Path<(i64, i64)>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let key = attempt_key(&claims, quiz_id, attempt_number)?;
    let result = attempts.submit(key, req.answers).await?;

    Ok(Json(result))
}

/// Discards a running attempt. Nothing is recorded.
pub async fn abandon_attempt(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, attempt_number)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let key = attempt_key(&claims, quiz_id, attempt_number)?;
    attempts.abandon(key).await?;

    Ok(StatusCode::NO_CONTENT)
}
