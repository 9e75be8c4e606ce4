// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'quizzes' table joined with its parent module.
/// Immutable for the lifetime of any attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub module_id: i64,

    /// Resolved through `modules.course_id`; used for entitlement and progress.
    pub course_id: i64,

    pub title: String,
    pub description: String,

    /// Minimum total points for a passing attempt.
    pub passing_score: i64,

    /// Seconds; `None` means untimed.
    pub max_time_limit: Option<i64>,

    pub max_attempts: i64,
}

impl Quiz {
    pub fn passes(&self, score: i64) -> bool {
        score >= self.passing_score
    }
}

/// DTO for the quiz metadata returned when an attempt starts.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub description: String,
    pub passing_score: i64,
    pub max_time_limit: Option<i64>,
    pub max_attempts: i64,
}

impl From<&Quiz> for QuizSummary {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            module_id: quiz.module_id,
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            passing_score: quiz.passing_score,
            max_time_limit: quiz.max_time_limit,
            max_attempts: quiz.max_attempts,
        }
    }
}
