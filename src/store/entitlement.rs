// src/store/entitlement.rs

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::QuizError;

/// Decides whether a user may take quizzes of a course.
#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn is_authorized(&self, user_id: i64, course_id: i64) -> Result<bool, QuizError>;
}

/// Grants access to users enrolled in the course by the checkout flow.
#[derive(Clone)]
pub struct EnrollmentGate {
    pool: SqlitePool,
}

impl EnrollmentGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementGate for EnrollmentGate {
    async fn is_authorized(&self, user_id: i64, course_id: i64) -> Result<bool, QuizError> {
        let enrolled: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM enrollments WHERE user_id = ? AND course_id = ?",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(enrolled > 0)
    }
}
