// src/handlers/progress.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, quiz::AttemptService, utils::jwt::Claims};

/// Get the caller's progress through a course's quizzes.
pub async fn get_course_progress(
    State(attempts): State<Arc<AttemptService>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let progress = attempts
        .course_progress(user_id, course_id)
        .await?
        .ok_or(AppError::NotFound("No progress recorded for this course".to_string()))?;

    Ok(Json(progress))
}
