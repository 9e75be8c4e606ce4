// src/models/progress.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::attempt::QuizAttempt;

/// Which attempt of each quiz counts towards course progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Highest score; ties go to the earlier attempt.
    #[default]
    Best,
    /// Highest attempt number.
    Latest,
}

impl ProgressPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressPolicy::Best => "best",
            ProgressPolicy::Latest => "latest",
        }
    }

    fn select<'a>(self, attempts: &[&'a QuizAttempt]) -> Option<&'a QuizAttempt> {
        match self {
            ProgressPolicy::Best => attempts.iter().copied().max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then(b.attempt_number.cmp(&a.attempt_number))
            }),
            ProgressPolicy::Latest => attempts.iter().copied().max_by_key(|a| a.attempt_number),
        }
    }
}

impl std::str::FromStr for ProgressPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(ProgressPolicy::Best),
            "latest" => Ok(ProgressPolicy::Latest),
            other => Err(format!("unknown progress policy '{other}'")),
        }
    }
}

/// Represents the 'course_progress' table in the database.
/// Per (user, course) summary, rewritten after every persisted attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CourseProgress {
    pub user_id: i64,
    pub course_id: i64,
    pub policy: ProgressPolicy,
    pub quizzes_total: i64,
    pub quizzes_attempted: i64,
    pub quizzes_passed: i64,
    pub score: f64,
    pub max_score: f64,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl CourseProgress {
    /// Recomputes the aggregate from every attempt the user has made on the
    /// course's quizzes. Unfinished attempts are ignored.
    pub fn aggregate(
        user_id: i64,
        course_id: i64,
        policy: ProgressPolicy,
        quizzes_total: i64,
        attempts: &[QuizAttempt],
        now: DateTime<Utc>,
    ) -> Self {
        let mut by_quiz: BTreeMap<i64, Vec<&QuizAttempt>> = BTreeMap::new();
        for attempt in attempts.iter().filter(|a| a.completed && a.user_id == user_id) {
            by_quiz.entry(attempt.quiz_id).or_default().push(attempt);
        }

        let counted: Vec<&QuizAttempt> = by_quiz
            .values()
            .filter_map(|list| policy.select(list))
            .collect();

        let quizzes_passed = counted.iter().filter(|a| a.passed).count() as i64;

        Self {
            user_id,
            course_id,
            policy,
            quizzes_total,
            quizzes_attempted: counted.len() as i64,
            quizzes_passed,
            score: counted.iter().map(|a| a.score).sum(),
            max_score: counted.iter().map(|a| a.max_score).sum(),
            completed: quizzes_total > 0 && quizzes_passed >= quizzes_total,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::FinishReason;

    fn attempt(quiz_id: i64, number: i64, score: f64, passed: bool) -> QuizAttempt {
        QuizAttempt {
            id: quiz_id * 100 + number,
            user_id: 1,
            quiz_id,
            attempt_number: number,
            total_questions: 2,
            answered_questions: 2,
            correct_answers: (score / 50.0) as i64,
            score,
            max_score: 100.0,
            passed,
            completed: true,
            finish_reason: FinishReason::Submitted,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn best_policy_keeps_highest_score() {
        let attempts = vec![
            attempt(1, 1, 100.0, true),
            attempt(1, 2, 50.0, false),
            attempt(2, 1, 0.0, false),
        ];
        let p = CourseProgress::aggregate(1, 9, ProgressPolicy::Best, 2, &attempts, Utc::now());

        assert_eq!(p.quizzes_attempted, 2);
        assert_eq!(p.quizzes_passed, 1);
        assert_eq!(p.score, 100.0);
        assert_eq!(p.max_score, 200.0);
        assert!(!p.completed);
    }

    #[test]
    fn latest_policy_keeps_last_attempt() {
        let attempts = vec![attempt(1, 1, 100.0, true), attempt(1, 2, 50.0, false)];
        let p = CourseProgress::aggregate(1, 9, ProgressPolicy::Latest, 1, &attempts, Utc::now());

        assert_eq!(p.quizzes_passed, 0);
        assert_eq!(p.score, 50.0);
    }

    #[test]
    fn course_completes_when_every_quiz_passes() {
        let attempts = vec![attempt(1, 1, 100.0, true), attempt(2, 3, 100.0, true)];
        let p = CourseProgress::aggregate(1, 9, ProgressPolicy::Best, 2, &attempts, Utc::now());
        assert!(p.completed);

        let empty = CourseProgress::aggregate(1, 9, ProgressPolicy::Best, 0, &[], Utc::now());
        assert!(!empty.completed);
        assert_eq!(empty.quizzes_attempted, 0);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("LATEST".parse::<ProgressPolicy>().unwrap(), ProgressPolicy::Latest);
        assert!("median".parse::<ProgressPolicy>().is_err());
    }
}
