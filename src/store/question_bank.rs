// src/store/question_bank.rs

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    error::QuizError,
    models::{
        question::{Question, QuestionRow},
        quiz::Quiz,
    },
};

/// Read-only source of quizzes and their ordered questions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn find_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, QuizError>;

    /// Ascending by position; ties keep insertion order.
    async fn questions_for(&self, quiz_id: i64) -> Result<Vec<Question>, QuizError>;
}

#[derive(Clone)]
pub struct SqlQuestionBank {
    pool: SqlitePool,
}

impl SqlQuestionBank {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for SqlQuestionBank {
    async fn find_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, QuizError> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT
                q.id,
                q.module_id,
                m.course_id,
                q.title,
                q.description,
                q.passing_score,
                q.max_time_limit,
                q.max_attempts
            FROM quizzes q
            JOIN modules m ON m.id = q.module_id
            WHERE q.id = ?
            "#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz {}: {:?}", quiz_id, e);
            QuizError::from(e)
        })?;

        Ok(quiz)
    }

    async fn questions_for(&self, quiz_id: i64) -> Result<Vec<Question>, QuizError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, quiz_id, question_type, prompt, options, answer_key, points, position
            FROM questions
            WHERE quiz_id = ?
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions of quiz {}: {:?}", quiz_id, e);
            QuizError::from(e)
        })?;

        rows.into_iter().map(Question::try_from).collect()
    }
}
