// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{
    question::{PublicQuestion, SubmittedAnswer},
    quiz::QuizSummary,
};

/// Why an attempt left the in-progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FinishReason {
    Submitted,
    TimedOut,
}

/// Grading outcome for a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub correct: bool,
    pub points_awarded: i64,
}

/// The finalized payload of a graded session, handed to the progress store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptResult {
    pub user_id: i64,
    pub quiz_id: i64,
    pub course_id: i64,
    pub attempt_number: i64,
    pub reason: FinishReason,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub score: i64,
    pub max_score: i64,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub breakdown: Vec<QuestionOutcome>,
}

/// Represents the 'quiz_attempts' table in the database.
/// One row per (user, quiz, attempt_number).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i64,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
    pub completed: bool,
    pub finish_reason: FinishReason,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// DTO returned when an attempt starts. Carries no answer keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_number: i64,
    pub quiz: QuizSummary,
    pub questions: Vec<PublicQuestion>,
    pub started_at: DateTime<Utc>,
    /// Seconds until the attempt is submitted automatically; absent when untimed.
    pub expires_in: Option<i64>,
    pub attempts_left: i64,
}

/// DTO for recording a single answer while the attempt is running.
#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub answer: SubmittedAnswer,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    /// Key: Question ID. Entries override answers recorded earlier; omitted
    /// questions keep their recorded answer or count as unanswered.
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub answers: HashMap<i64, SubmittedAnswer>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt_number: i64,
    pub reason: FinishReason,
    pub score: i64,
    pub max_score: i64,
    pub passed: bool,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub breakdown: Vec<QuestionOutcome>,
    pub attempts_left: i64,
}

impl SubmitAttemptResponse {
    pub fn new(result: AttemptResult, attempts_left: i64) -> Self {
        Self {
            attempt_number: result.attempt_number,
            reason: result.reason,
            score: result.score,
            max_score: result.max_score,
            passed: result.passed,
            total_questions: result.total_questions,
            answered_questions: result.answered_questions,
            correct_answers: result.correct_answers,
            breakdown: result.breakdown,
            attempts_left,
        }
    }
}

/// Lifecycle of an attempt session.
///
/// `Graded` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NotStarted,
    InProgress,
    Submitted,
    TimedOut,
    Graded,
    Abandoned,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveAttemptStatus {
    pub attempt_number: i64,
    pub state: AttemptState,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
    pub answered_questions: i64,
    pub total_questions: i64,
}

/// Either a session still held in memory or the durable record of a finished one.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptStatus {
    Live(LiveAttemptStatus),
    Recorded(QuizAttempt),
}
