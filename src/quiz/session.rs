// src/quiz/session.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::QuizError,
    models::{
        attempt::{AttemptResult, AttemptState, FinishReason, LiveAttemptStatus},
        question::{Question, SubmittedAnswer},
        quiz::Quiz,
    },
    quiz::{
        clock::{Countdown, Tick},
        scoring::{self, Scorecard},
    },
};

/// Identity of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AttemptKey {
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i64,
}

/// One learner's attempt at one quiz, held in memory until it is graded or
/// abandoned.
///
/// Pure state machine: it never blocks and never touches storage. The
/// owning service serializes every call (clock ticks included) behind one lock.
#[derive(Debug)]
pub struct AttemptSession {
    key: AttemptKey,
    quiz: Quiz,
    questions: Vec<Question>,
    state: AttemptState,
    countdown: Countdown,
    started_at: Option<DateTime<Utc>>,
    answers: HashMap<i64, SubmittedAnswer>,
    result: Option<AttemptResult>,
}

impl AttemptSession {
    /// Questions are presented by ascending `position`; equal positions keep
    /// the order the bank supplied them in.
    pub fn new(key: AttemptKey, quiz: Quiz, mut questions: Vec<Question>) -> Self {
        questions.sort_by_key(|q| q.position);
        Self {
            key,
            quiz,
            questions,
            state: AttemptState::NotStarted,
            countdown: Countdown::new(None),
            started_at: None,
            answers: HashMap::new(),
            result: None,
        }
    }

    pub fn key(&self) -> AttemptKey {
        self.key
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_timed(&self) -> bool {
        self.countdown.is_timed()
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        self.countdown.remaining().map(|s| s as i64)
    }

    /// `attempts_used` counts every attempt already claimed for this
    /// (user, quiz), this one excluded.
    pub fn start(&mut self, attempts_used: i64, now: DateTime<Utc>) -> Result<(), QuizError> {
        if self.state != AttemptState::NotStarted {
            return Err(QuizError::NotInProgress);
        }
        if attempts_used >= self.quiz.max_attempts {
            return Err(QuizError::AttemptsExhausted {
                max_attempts: self.quiz.max_attempts,
            });
        }

        self.answers.clear();
        self.countdown = Countdown::new(self.quiz.max_time_limit.map(|s| s.max(0) as u64));
        self.started_at = Some(now);
        self.state = AttemptState::InProgress;
        Ok(())
    }

    /// Moves a running attempt to the number the store actually reserved.
    pub fn assign_number(&mut self, attempt_number: i64) -> Result<(), QuizError> {
        self.ensure_in_progress()?;
        self.key.attempt_number = attempt_number;
        Ok(())
    }

    /// Last write wins.
    pub fn record_answer(
        &mut self,
        question_id: i64,
        answer: SubmittedAnswer,
    ) -> Result<(), QuizError> {
        self.ensure_in_progress()?;
        self.ensure_known(question_id)?;
        self.answers.insert(question_id, answer);
        Ok(())
    }

    /// Merges `answers` over the recorded ones and submits. Nothing is applied
    /// if any id is foreign to the quiz.
    pub fn submit(
        &mut self,
        answers: HashMap<i64, SubmittedAnswer>,
        now: DateTime<Utc>,
    ) -> Result<&AttemptResult, QuizError> {
        self.ensure_in_progress()?;
        for id in answers.keys() {
            self.ensure_known(*id)?;
        }
        self.answers.extend(answers);
        Ok(self.finish(FinishReason::Submitted, now))
    }

    /// Advances the countdown by one step. On expiry the session moves to
    /// `TimedOut` and is graded with whatever was recorded.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.state != AttemptState::InProgress {
            return Tick::Stopped;
        }
        let tick = self.countdown.tick();
        if tick == Tick::Expired {
            self.finish(FinishReason::TimedOut, now);
        }
        tick
    }

    pub fn abandon(&mut self) -> Result<(), QuizError> {
        self.ensure_in_progress()?;
        self.countdown.stop();
        self.answers.clear();
        self.state = AttemptState::Abandoned;
        Ok(())
    }

    /// Scores the current answer map. Same answers, same scorecard.
    pub fn grade(&self) -> Scorecard {
        scoring::grade_all(&self.questions, &self.answers)
    }

    /// The finalized result while it waits to be persisted.
    pub fn pending_result(&self) -> Option<&AttemptResult> {
        match self.state {
            AttemptState::Submitted | AttemptState::TimedOut => self.result.as_ref(),
            _ => None,
        }
    }

    /// Called once the result is durable.
    pub fn mark_graded(&mut self) -> Result<(), QuizError> {
        match self.state {
            AttemptState::Submitted | AttemptState::TimedOut => {
                self.state = AttemptState::Graded;
                Ok(())
            }
            AttemptState::Graded => Err(QuizError::AlreadySubmitted),
            _ => Err(QuizError::NotInProgress),
        }
    }

    pub fn status(&self) -> LiveAttemptStatus {
        LiveAttemptStatus {
            attempt_number: self.key.attempt_number,
            state: self.state,
            started_at: self.started_at,
            remaining_seconds: self.remaining_seconds(),
            answered_questions: self.answers.len() as i64,
            total_questions: self.questions.len() as i64,
        }
    }

    fn finish(&mut self, reason: FinishReason, now: DateTime<Utc>) -> &AttemptResult {
        self.countdown.stop();
        self.state = match reason {
            FinishReason::Submitted => AttemptState::Submitted,
            FinishReason::TimedOut => AttemptState::TimedOut,
        };

        let card = self.grade();
        let result = AttemptResult {
            user_id: self.key.user_id,
            quiz_id: self.key.quiz_id,
            course_id: self.quiz.course_id,
            attempt_number: self.key.attempt_number,
            reason,
            total_questions: card.total_questions,
            answered_questions: card.answered_questions,
            correct_answers: card.correct_answers,
            score: card.score,
            max_score: card.max_score,
            passed: self.quiz.passes(card.score),
            started_at: self.started_at.unwrap_or(now),
            completed_at: now,
            breakdown: card.breakdown,
        };
        self.result.insert(result)
    }

    fn ensure_in_progress(&self) -> Result<(), QuizError> {
        match self.state {
            AttemptState::InProgress => Ok(()),
            AttemptState::Submitted | AttemptState::TimedOut | AttemptState::Graded => {
                Err(QuizError::AlreadySubmitted)
            }
            AttemptState::NotStarted | AttemptState::Abandoned => Err(QuizError::NotInProgress),
        }
    }

    fn ensure_known(&self, question_id: i64) -> Result<(), QuizError> {
        if self.questions.iter().any(|q| q.id == question_id) {
            Ok(())
        } else {
            Err(QuizError::UnknownQuestion(question_id))
        }
    }
}
