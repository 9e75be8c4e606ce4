// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use quiz_engine::{
    error::QuizError,
    models::{
        attempt::{AttemptResult, QuizAttempt},
        progress::{CourseProgress, ProgressPolicy},
        question::{AnswerKey, Question},
        quiz::Quiz,
    },
    quiz::{AttemptService, EngineSettings},
    store::{AttemptTally, EntitlementGate, ProgressStore, QuestionBank},
};

pub fn quiz(passing_score: i64, max_time_limit: Option<i64>, max_attempts: i64) -> Quiz {
    Quiz {
        id: 1,
        module_id: 1,
        course_id: 1,
        title: "Ownership".to_string(),
        description: "Moves and borrows".to_string(),
        passing_score,
        max_time_limit,
        max_attempts,
    }
}

pub fn multiple_choice(id: i64, correct: &str, points: i64) -> Question {
    Question {
        id,
        quiz_id: 1,
        prompt: format!("Question {id}"),
        options: vec!["a".into(), "b".into(), "c".into()],
        key: AnswerKey::MultipleChoice {
            correct: correct.to_string(),
        },
        points,
        position: id,
    }
}

/// Two 50-point multiple-choice questions, keys q1 = "a" and q2 = "b".
pub fn two_question_bank(max_time_limit: Option<i64>, max_attempts: i64) -> StaticBank {
    StaticBank {
        quiz: quiz(80, max_time_limit, max_attempts),
        questions: vec![multiple_choice(1, "a", 50), multiple_choice(2, "b", 50)],
    }
}

pub struct StaticBank {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

#[async_trait]
impl QuestionBank for StaticBank {
    async fn find_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, QuizError> {
        Ok((quiz_id == self.quiz.id).then(|| self.quiz.clone()))
    }

    async fn questions_for(&self, quiz_id: i64) -> Result<Vec<Question>, QuizError> {
        Ok(self
            .questions
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect())
    }
}

pub struct StaticGate(pub bool);

#[async_trait]
impl EntitlementGate for StaticGate {
    async fn is_authorized(&self, _user_id: i64, _course_id: i64) -> Result<bool, QuizError> {
        Ok(self.0)
    }
}

/// Keeps claims and records in memory; can be told to fail the next N writes
/// or to reject every write outright.
#[derive(Default)]
pub struct MemoryStore {
    claims: Mutex<Vec<(i64, i64, i64)>>,
    records: Mutex<Vec<QuizAttempt>>,
    failures_left: AtomicU32,
    persist_calls: AtomicU32,
    rejecting: bool,
}

impl MemoryStore {
    pub fn failing(times: u32) -> Self {
        let store = Self::default();
        store.failures_left.store(times, Ordering::SeqCst);
        store
    }

    pub fn rejecting() -> Self {
        Self {
            rejecting: true,
            ..Self::default()
        }
    }

    pub fn heal(&self) {
        self.failures_left.store(0, Ordering::SeqCst);
    }

    pub fn persist_calls(&self) -> u32 {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<QuizAttempt> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn tally(&self, user_id: i64, quiz_id: i64) -> Result<AttemptTally, QuizError> {
        let claims = self.claims.lock().unwrap();
        let mine: Vec<i64> = claims
            .iter()
            .filter(|(u, q, _)| *u == user_id && *q == quiz_id)
            .map(|(_, _, n)| *n)
            .collect();
        Ok(AttemptTally {
            used: mine.len() as i64,
            last_number: mine.iter().copied().max().unwrap_or(0),
        })
    }

    async fn claim(
        &self,
        user_id: i64,
        quiz_id: i64,
        attempt_number: i64,
        _claimed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, QuizError> {
        let mut claims = self.claims.lock().unwrap();
        let mut number = attempt_number;
        while claims.contains(&(user_id, quiz_id, number)) {
            number += 1;
        }
        claims.push((user_id, quiz_id, number));
        Ok(number)
    }

    async fn persist(&self, result: &AttemptResult) -> Result<QuizAttempt, QuizError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejecting {
            return Err(QuizError::RecordRejected("CHECK constraint failed".to_string()));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QuizError::PersistenceFailure("disk unavailable".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter().find(|r| {
            r.user_id == result.user_id
                && r.quiz_id == result.quiz_id
                && r.attempt_number == result.attempt_number
        }) {
            return Ok(existing.clone());
        }

        let record = QuizAttempt {
            id: records.len() as i64 + 1,
            user_id: result.user_id,
            quiz_id: result.quiz_id,
            attempt_number: result.attempt_number,
            total_questions: result.total_questions,
            answered_questions: result.answered_questions,
            correct_answers: result.correct_answers,
            score: result.score as f64,
            max_score: result.max_score as f64,
            passed: result.passed,
            completed: true,
            finish_reason: result.reason,
            started_at: result.started_at,
            completed_at: Some(result.completed_at),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
        attempt_number: i64,
    ) -> Result<Option<QuizAttempt>, QuizError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.user_id == user_id && r.quiz_id == quiz_id && r.attempt_number == attempt_number
            })
            .cloned())
    }

    async fn list_attempts(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<QuizAttempt>, QuizError> {
        let mut list: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.quiz_id == quiz_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.attempt_number);
        Ok(list)
    }

    async fn course_progress(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseProgress>, QuizError> {
        let records = self.records();
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(CourseProgress::aggregate(
            user_id,
            course_id,
            ProgressPolicy::Best,
            1,
            &records,
            chrono::Utc::now(),
        )))
    }
}

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        tick: std::time::Duration::from_millis(10),
        persist_max_retries: 3,
        persist_retry_backoff: std::time::Duration::from_millis(1),
        idle_timeout: None,
    }
}

pub fn service(
    bank: StaticBank,
    store: Arc<MemoryStore>,
    entitled: bool,
    settings: EngineSettings,
) -> Arc<AttemptService> {
    Arc::new(AttemptService::new(
        Arc::new(bank),
        store,
        Arc::new(StaticGate(entitled)),
        settings,
    ))
}
