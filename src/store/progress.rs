// src/store/progress.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::QuizError,
    models::{
        attempt::{AttemptResult, QuizAttempt},
        progress::{CourseProgress, ProgressPolicy},
    },
};

/// How far `claim` walks past a taken attempt number before giving up.
const MAX_NUMBER_CLAIMS: u32 = 32;

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, attempt_number, total_questions, \
     answered_questions, correct_answers, score, max_score, passed, completed, \
     finish_reason, started_at, completed_at";

/// Attempt numbers already claimed for one (user, quiz), finished or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptTally {
    pub used: i64,
    pub last_number: i64,
}

/// Sole writer of attempt claims, durable attempt records and course progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Never shrinks: abandoned and unfinished attempts stay counted.
    async fn tally(&self, user_id: i64, quiz_id: i64) -> Result<AttemptTally, QuizError>;

    /// Reserves `attempt_number`, or the next free number if it is taken, and
    /// returns the number actually reserved.
    async fn claim(
        &self,
        user_id: i64,
        quiz_id: i64,
        attempt_number: i64,
        claimed_at: DateTime<Utc>,
    ) -> Result<i64, QuizError>;

    /// Writes the attempt and recomputes the course aggregate in one
    /// transaction. Writing an attempt that is already on record returns the
    /// stored record unchanged.
    async fn claim(
        &self,
        user_id: i64,
        quiz_id: i64,
        attempt_number: i64,
        claimed_at: DateTime<Utc>,
    ) -> Result<i64, QuizError> {
        let mut number = attempt_number;
        for _ in 0..MAX_NUMBER_CLAIMS {
            let inserted = sqlx::query(
                r#"
                INSERT INTO attempt_claims (user_id, quiz_id, attempt_number, claimed_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(quiz_id)
            .bind(number)
            .bind(claimed_at)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => return Ok(number),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    tracing::warn!(
                        "Attempt number {} of quiz {} already claimed for user {}, trying {}",
                        number,
                        quiz_id,
                        user_id,
                        number + 1
                    );
                    number += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(QuizError::PersistenceConflict(MAX_NUMBER_CLAIMS))
    }

    async fn persist(&self, result: &AttemptResult) -> Result<QuizAttempt, QuizError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            INSERT INTO quiz_attempts (
                user_id, quiz_id, attempt_number, total_questions, answered_questions,
                correct_answers, score, max_score, passed, completed, finish_reason,
                started_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?, ?)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(result.user_id)
        .bind(result.quiz_id)
        .bind(result.attempt_number)
        .bind(result.total_questions)
        .bind(result.answered_questions)
        .bind(result.correct_answers)
        .bind(result.score as f64)
        .bind(result.max_score as f64)
        .bind(result.passed)
        .bind(result.reason)
        .bind(result.started_at)
        .bind(result.completed_at)
        .fetch_one(&mut *tx)
        .await;

        let attempt = match inserted {
            Ok(row) => row,
            // Claims are unique, so the stored row is this attempt's earlier write.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await?;
                tracing::info!(
                    "Attempt {} of quiz {} for user {} is already on record",
                    result.attempt_number,
                    result.quiz_id,
                    result.user_id
                );
                return self
                    .find_attempt(result.user_id, result.quiz_id, result.attempt_number)
                    .await?
                    .ok_or(QuizError::AttemptNotFound {
                        quiz_id: result.quiz_id,
                        attempt_number: result.attempt_number,
                    });
            }
            Err(e) => return Err(e.into()),
        };

        let quizzes_total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM quizzes q
            JOIN modules m ON m.id = q.module_id
            WHERE m.course_id = ?
            "#,
        )
        .bind(result.course_id)
        .fetch_one(&mut *tx)
        .await?;

        let course_attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM quiz_attempts
            WHERE user_id = ?
              AND quiz_id IN (
                SELECT q.id FROM quizzes q
                JOIN modules m ON m.id = q.module_id
                WHERE m.course_id = ?
              )
            "#
        ))
        .bind(result.user_id)
        .bind(result.course_id)
        .fetch_all(&mut *tx)
        .await?;

        let progress = CourseProgress::aggregate(
            result.user_id,
            result.course_id,
            self.policy,
            quizzes_total,
            &course_attempts,
            Utc::now(),
        );

        sqlx::query(
            r#"
            INSERT INTO course_progress (
                user_id, course_id, policy, quizzes_total, quizzes_attempted,
                quizzes_passed, score, max_score, completed, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                policy = excluded.policy,
                quizzes_total = excluded.quizzes_total,
                quizzes_attempted = excluded.quizzes_attempted,
                quizzes_passed = excluded.quizzes_passed,
                score = excluded.score,
                max_score = excluded.max_score,
                completed = excluded.completed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(progress.user_id)
        .bind(progress.course_id)
        .bind(progress.policy)
        .bind(progress.quizzes_total)
        .bind(progress.quizzes_attempted)
        .bind(progress.quizzes_passed)
        .bind(progress.score)
        .bind(progress.max_score)
        .bind(progress.completed)
        .bind(progress.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Persisted attempt {} of quiz {} for user {}: {}/{} (passed: {})",
            attempt.attempt_number,
            attempt.quiz_id,
            attempt.user_id,
            attempt.score,
            attempt.max_score,
            attempt.passed
        );

        Ok(attempt)
    }

    async fn find_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
        attempt_number: i64,
    ) -> Result<Option<QuizAttempt>, QuizError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
             WHERE user_id = ? AND quiz_id = ? AND attempt_number = ?"
        ))
        .bind(user_id)
        .bind(quiz_id)
        .bind(attempt_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn list_attempts(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<QuizAttempt>, QuizError> {
        let attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
             WHERE user_id = ? AND quiz_id = ?
             ORDER BY attempt_number ASC"
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn course_progress(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseProgress>, QuizError> {
        let progress = sqlx::query_as::<_, CourseProgress>(
            r#"
            SELECT user_id, course_id, policy, quizzes_total, quizzes_attempted,
                   quizzes_passed, score, max_score, completed, updated_at
            FROM course_progress
            WHERE user_id = ? AND course_id = ?
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::attempt::FinishReason};

    async fn seeded() -> SqlitePool {
        let pool = db::memory_pool().await.unwrap();
        for sql in [
            "INSERT INTO courses (id, title) VALUES (1, 'Rust')",
            "INSERT INTO modules (id, course_id, title) VALUES (1, 1, 'Basics')",
            "INSERT INTO quizzes (id, module_id, title, passing_score, max_attempts)
             VALUES (1, 1, 'Ownership', 80, 3), (2, 1, 'Traits', 50, 3)",
        ] {
            sqlx::query(sql).execute(&pool).await.unwrap();
        }
        pool
    }

    fn result(quiz_id: i64, attempt_number: i64, score: i64, passed: bool) -> AttemptResult {
        AttemptResult {
            user_id: 7,
            quiz_id,
            course_id: 1,
            attempt_number,
            reason: FinishReason::Submitted,
            total_questions: 2,
            answered_questions: 2,
            correct_answers: score / 50,
            score,
            max_score: 100,
            passed,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            breakdown: vec![],
        }
    }

    #[tokio::test]
    async fn persist_writes_a_completed_record() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);

        let record = store.persist(&result(1, 1, 100, true)).await.unwrap();
        assert_eq!(record.attempt_number, 1);
        assert!(record.completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.score, 100.0);
        assert_eq!(record.finish_reason, FinishReason::Submitted);
    }

    #[tokio::test]
    async fn persisting_twice_returns_the_stored_record() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);

        let first = store.persist(&result(1, 1, 100, true)).await.unwrap();
        let again = store.persist(&result(1, 1, 0, false)).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(store.list_attempts(7, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_violations_are_not_retryable() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);

        let mut bad = result(1, 1, 100, true);
        bad.answered_questions = 5;
        let err = store.persist(&bad).await.unwrap_err();
        assert!(matches!(err, QuizError::RecordRejected(_)), "got {err:?}");
        assert!(store.list_attempts(7, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claims_count_whether_or_not_they_finish() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);
        assert_eq!(store.tally(7, 1).await.unwrap(), AttemptTally::default());

        assert_eq!(store.claim(7, 1, 1, Utc::now()).await.unwrap(), 1);
        assert_eq!(store.claim(7, 1, 2, Utc::now()).await.unwrap(), 2);
        store.persist(&result(1, 2, 50, false)).await.unwrap();

        let tally = store.tally(7, 1).await.unwrap();
        assert_eq!(tally, AttemptTally { used: 2, last_number: 2 });
        assert_eq!(store.tally(8, 1).await.unwrap(), AttemptTally::default());
    }

    #[tokio::test]
    async fn taken_numbers_move_to_the_next_one() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);

        store.claim(7, 1, 1, Utc::now()).await.unwrap();
        store.claim(7, 1, 2, Utc::now()).await.unwrap();
        assert_eq!(store.claim(7, 1, 1, Utc::now()).await.unwrap(), 3);
        assert_eq!(
            store.tally(7, 1).await.unwrap(),
            AttemptTally { used: 3, last_number: 3 }
        );
    }

    #[tokio::test]
    async fn course_progress_tracks_best_attempts() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);

        store.persist(&result(1, 1, 100, true)).await.unwrap();
        let progress = store.course_progress(7, 1).await.unwrap().unwrap();
        assert_eq!(progress.quizzes_total, 2);
        assert_eq!(progress.quizzes_passed, 1);
        assert!(!progress.completed);

        store.persist(&result(1, 2, 0, false)).await.unwrap();
        store.persist(&result(2, 1, 50, true)).await.unwrap();
        let progress = store.course_progress(7, 1).await.unwrap().unwrap();
        assert_eq!(progress.quizzes_passed, 2);
        assert_eq!(progress.score, 150.0);
        assert!(progress.completed);
        assert_eq!(progress.policy, ProgressPolicy::Best);
    }

    #[tokio::test]
    async fn latest_policy_follows_the_newest_attempt() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Latest);

        store.persist(&result(1, 1, 100, true)).await.unwrap();
        store.persist(&result(1, 2, 50, false)).await.unwrap();
        let progress = store.course_progress(7, 1).await.unwrap().unwrap();
        assert_eq!(progress.quizzes_passed, 0);
        assert_eq!(progress.score, 50.0);
    }

    #[tokio::test]
    async fn find_attempt_by_number() {
        let store = SqlProgressStore::new(seeded().await, ProgressPolicy::Best);
        store.persist(&result(2, 1, 50, true)).await.unwrap();

        assert!(store.find_attempt(7, 2, 1).await.unwrap().is_some());
        assert!(store.find_attempt(7, 2, 2).await.unwrap().is_none());
        assert!(store.course_progress(8, 1).await.unwrap().is_none());
    }
}
