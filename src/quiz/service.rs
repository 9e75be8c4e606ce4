// src/quiz/service.rs

use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::Utc;
use tokio::time::Instant;

use crate::{
    config::Config,
    error::QuizError,
    models::{
        attempt::{
            AttemptResult, AttemptState, AttemptStatus, QuizAttempt, StartAttemptResponse,
            SubmitAttemptResponse,
        },
        progress::CourseProgress,
        question::{PublicQuestion, SubmittedAnswer},
        quiz::QuizSummary,
    },
    quiz::{
        clock::{self, AttemptClock, Tick},
        session::{AttemptKey, AttemptSession},
    },
    store::{EntitlementGate, ProgressStore, QuestionBank},
};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Period of one countdown step.
    pub tick: Duration,
    pub persist_max_retries: u32,
    /// Multiplied by the retry count before each new try.
    pub persist_retry_backoff: Duration,
    /// See [`AttemptService::spawn_reaper`].
    pub idle_timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick: clock::TICK,
            persist_max_retries: 3,
            persist_retry_backoff: Duration::from_millis(200),
            idle_timeout: Some(Duration::from_secs(7200)),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick: clock::TICK,
            persist_max_retries: config.persist_max_retries,
            persist_retry_backoff: config.persist_retry_backoff,
            idle_timeout: config.session_idle_timeout,
        }
    }
}

/// A session held in memory together with its clock.
struct LiveSession {
    session: Mutex<AttemptSession>,
    clock: Mutex<Option<AttemptClock>>,
    /// Held while a result is being persisted so it is written once.
    finalizing: tokio::sync::Mutex<()>,
    last_seen: Mutex<Instant>,
}

impl LiveSession {
    fn new(session: AttemptSession) -> Self {
        Self {
            session: Mutex::new(session),
            clock: Mutex::new(None),
            finalizing: tokio::sync::Mutex::new(()),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *lock(&self.last_seen) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*lock(&self.last_seen))
    }

    fn stop_clock(&self) {
        if let Some(clock) = lock(&self.clock).take() {
            clock.cancel();
        }
    }
}

/// Runs attempts: owns every live session and talks to the question bank,
/// the entitlement gate and the progress store on their behalf.
pub struct AttemptService {
    bank: Arc<dyn QuestionBank>,
    store: Arc<dyn ProgressStore>,
    gate: Arc<dyn EntitlementGate>,
    settings: EngineSettings,
    live: Mutex<HashMap<AttemptKey, Arc<LiveSession>>>,
    /// Serializes attempt-number assignment.
    numbering: tokio::sync::Mutex<()>,
}

impl AttemptService {
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        store: Arc<dyn ProgressStore>,
        gate: Arc<dyn EntitlementGate>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            bank,
            store,
            gate,
            settings,
            live: Mutex::new(HashMap::new()),
            numbering: tokio::sync::Mutex::new(()),
        }
    }

    /// Starts a new attempt and, for timed quizzes, its clock.
    ///
    /// The returned payload never contains answer keys.
    pub async fn start(
        self: &Arc<Self>,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<StartAttemptResponse, QuizError> {
        let quiz = self
            .bank
            .find_quiz(quiz_id)
            .await?
            .ok_or(QuizError::QuizNotFound(quiz_id))?;

        if !self.gate.is_authorized(user_id, quiz.course_id).await? {
            tracing::warn!("User {} is not entitled to quiz {}", user_id, quiz_id);
            return Err(QuizError::NotEntitled);
        }

        let questions = self.bank.questions_for(quiz_id).await?;

        let numbering = self.numbering.lock().await;
        let tally = self.store.tally(user_id, quiz_id).await?;
        let attempts_used = tally.used;

        let mut key = AttemptKey {
            user_id,
            quiz_id,
            attempt_number: tally.last_number + 1,
        };
        let mut session = AttemptSession::new(key, quiz, questions);
        let now = Utc::now();
        session.start(attempts_used, now).inspect_err(|e| {
            tracing::info!("User {} cannot start quiz {}: {}", user_id, quiz_id, e);
        })?;

        let claimed = self
            .store
            .claim(user_id, quiz_id, key.attempt_number, now)
            .await?;
        if claimed != key.attempt_number {
            session.assign_number(claimed)?;
            key.attempt_number = claimed;
        }

        let response = StartAttemptResponse {
            attempt_number: key.attempt_number,
            quiz: QuizSummary::from(session.quiz()),
            questions: session.questions().iter().map(PublicQuestion::from).collect(),
            started_at: session.started_at().unwrap_or_else(Utc::now),
            expires_in: session.remaining_seconds(),
            attempts_left: (session.quiz().max_attempts - attempts_used - 1).max(0),
        };
        let timed = session.is_timed();

        let live = Arc::new(LiveSession::new(session));
        lock(&self.live).insert(key, live.clone());
        drop(numbering);

        if timed {
            *lock(&live.clock) = Some(self.spawn_clock(&live));
        }

        tracing::info!(
            "User {} started attempt {} of quiz {} (time limit: {:?}s)",
            user_id,
            key.attempt_number,
            quiz_id,
            response.expires_in
        );

        Ok(response)
    }

    /// Only touches storage when the attempt is no longer held in memory.
    pub async fn record_answer(
        &self,
        key: AttemptKey,
        question_id: i64,
        answer: SubmittedAnswer,
    ) -> Result<(), QuizError> {
        let Some(live) = self.live_session(&key) else {
            return Err(self.missing(key).await);
        };
        live.touch();
        let mut session = lock(&live.session);
        session.record_answer(question_id, answer)
    }

    /// Submits and grades an attempt, returning once the result is durable.
    ///
    /// If the attempt already timed out, or an earlier submit could not be
    /// persisted, the fixed result is persisted again and `answers` is ignored.
    pub async fn submit(
        &self,
        key: AttemptKey,
        answers: HashMap<i64, SubmittedAnswer>,
    ) -> Result<SubmitAttemptResponse, QuizError> {
        let Some(live) = self.live_session(&key) else {
            return Err(self.missing(key).await);
        };
        live.touch();

        let max_attempts = {
            let mut session = lock(&live.session);
            match session.state() {
                AttemptState::InProgress => {
                    let result = session.submit(answers, Utc::now())?;
                    tracing::info!(
                        "User {} submitted attempt {} of quiz {}: {}/{}",
                        key.user_id,
                        key.attempt_number,
                        key.quiz_id,
                        result.score,
                        result.max_score
                    );
                }
                AttemptState::Submitted | AttemptState::TimedOut => {
                    tracing::info!("Retrying persistence of attempt {:?}", key);
                }
                AttemptState::Graded => return Err(QuizError::AlreadySubmitted),
                AttemptState::NotStarted | AttemptState::Abandoned => {
                    return Err(QuizError::NotInProgress);
                }
            }
            session.quiz().max_attempts
        };
        live.stop_clock();

        let result = self.finalize(&live).await?;

        let used = match self.store.tally(key.user_id, key.quiz_id).await {
            Ok(tally) => tally.used,
            Err(e) => {
                tracing::warn!("Could not count attempts after submit: {}", e);
                result.attempt_number
            }
        };

        Ok(SubmitAttemptResponse::new(
            result,
            (max_attempts - used).max(0),
        ))
    }

    /// Drops a running attempt without recording a result. Its attempt number
    /// stays claimed.
    pub async fn abandon(&self, key: AttemptKey) -> Result<(), QuizError> {
        let Some(live) = self.live_session(&key) else {
            return Err(self.missing(key).await);
        };

        lock(&live.session).abandon()?;
        live.stop_clock();
        lock(&self.live).remove(&key);

        tracing::info!("Attempt {:?} abandoned", key);
        Ok(())
    }

    pub async fn status(&self, key: AttemptKey) -> Result<AttemptStatus, QuizError> {
        if let Some(live) = self.live_session(&key) {
            live.touch();
            return Ok(AttemptStatus::Live(lock(&live.session).status()));
        }

        self.store
            .find_attempt(key.user_id, key.quiz_id, key.attempt_number)
            .await?
            .map(AttemptStatus::Recorded)
            .ok_or(QuizError::AttemptNotFound {
                quiz_id: key.quiz_id,
                attempt_number: key.attempt_number,
            })
    }

    pub async fn history(&self, user_id: i64, quiz_id: i64) -> Result<Vec<QuizAttempt>, QuizError> {
        if self.bank.find_quiz(quiz_id).await?.is_none() {
            return Err(QuizError::QuizNotFound(quiz_id));
        }
        self.store.list_attempts(user_id, quiz_id).await
    }

    pub async fn course_progress(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseProgress>, QuizError> {
        self.store.course_progress(user_id, course_id).await
    }

    pub fn live_sessions(&self) -> usize {
        lock(&self.live).len()
    }

    /// Discards every live session. Nothing is persisted.
    pub fn shutdown(&self) {
        let drained: Vec<_> = lock(&self.live).drain().collect();
        for (_, live) in &drained {
            live.stop_clock();
        }
        if !drained.is_empty() {
            tracing::info!("Dropped {} live attempt(s) on shutdown", drained.len());
        }
    }

    /// Starts the background sweep that releases untimed attempts left idle
    /// for `idle_timeout` and retries results whose write failed. `None` when
    /// no idle timeout is configured. Dropping the handle stops the sweep.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<AttemptClock> {
        let idle = self.settings.idle_timeout?;
        let service = Arc::downgrade(self);

        Some(AttemptClock::spawn(idle / 2, move || {
            let service = service.clone();
            async move {
                let Some(service) = service.upgrade() else {
                    return ControlFlow::Break(());
                };
                service.reap_idle(idle).await;
                ControlFlow::Continue(())
            }
        }))
    }

    async fn reap_idle(&self, idle: Duration) {
        let now = Instant::now();
        let stale: Vec<_> = lock(&self.live)
            .iter()
            .filter(|(_, live)| live.idle_for(now) >= idle)
            .map(|(key, live)| (*key, live.clone()))
            .collect();

        for (key, live) in stale {
            let (state, timed) = {
                let session = lock(&live.session);
                (session.state(), session.is_timed())
            };
            match state {
                AttemptState::InProgress if !timed => {
                    if lock(&live.session).abandon().is_ok() {
                        lock(&self.live).remove(&key);
                        tracing::info!("Attempt {:?} released after {:?} idle", key, idle);
                    }
                }
                AttemptState::Submitted | AttemptState::TimedOut => {
                    if let Err(e) = self.finalize(&live).await {
                        tracing::warn!("Result of attempt {:?} still not recorded: {}", key, e);
                    }
                }
                _ => {}
            }
        }
    }

    fn live_session(&self, key: &AttemptKey) -> Option<Arc<LiveSession>> {
        lock(&self.live).get(key).cloned()
    }

    async fn missing(&self, key: AttemptKey) -> QuizError {
        match self
            .store
            .find_attempt(key.user_id, key.quiz_id, key.attempt_number)
            .await
        {
            Ok(Some(_)) => QuizError::AlreadySubmitted,
            Ok(None) => QuizError::AttemptNotFound {
                quiz_id: key.quiz_id,
                attempt_number: key.attempt_number,
            },
            Err(e) => e,
        }
    }

    fn spawn_clock(self: &Arc<Self>, live: &Arc<LiveSession>) -> AttemptClock {
        let service = Arc::downgrade(self);
        let live = Arc::downgrade(live);

        AttemptClock::spawn(self.settings.tick, move || {
            let service = service.clone();
            let live = live.clone();
            async move {
                let (Some(service), Some(live)) = (service.upgrade(), live.upgrade()) else {
                    return ControlFlow::Break(());
                };

                let (key, tick) = {
                    let mut session = lock(&live.session);
                    let tick = match session.state() {
                        // Expired earlier but the result is not durable yet.
                        AttemptState::TimedOut => Tick::Expired,
                        _ => session.tick(Utc::now()),
                    };
                    (session.key(), tick)
                };
                match tick {
                    Tick::Running { .. } => ControlFlow::Continue(()),
                    Tick::Expired => {
                        tracing::info!("Attempt {:?} timed out, submitting automatically", key);
                        match service.finalize(&live).await {
                            Ok(_) => ControlFlow::Break(()),
                            Err(QuizError::PersistenceFailure(e)) => {
                                tracing::warn!(
                                    "Timed out attempt {:?} not recorded yet ({}), retrying next tick",
                                    key,
                                    e
                                );
                                ControlFlow::Continue(())
                            }
                            Err(QuizError::AlreadySubmitted) => ControlFlow::Break(()),
                            Err(e) => {
                                tracing::error!(
                                    "Failed to finalize timed out attempt {:?}: {}",
                                    key,
                                    e
                                );
                                ControlFlow::Break(())
                            }
                        }
                    }
                    Tick::Stopped => ControlFlow::Break(()),
                }
            }
        })
    }

    /// Persists the pending result of a submitted or timed out session and
    /// retires the session.
    async fn finalize(&self, live: &Arc<LiveSession>) -> Result<AttemptResult, QuizError> {
        let _finalizing = live.finalizing.lock().await;

        let (key, result) = {
            let session = lock(&live.session);
            if session.state() == AttemptState::Graded {
                return Err(QuizError::AlreadySubmitted);
            }
            let result = session
                .pending_result()
                .cloned()
                .ok_or(QuizError::NotInProgress)?;
            (session.key(), result)
        };

        self.persist_with_retry(&result).await?;

        lock(&live.session).mark_graded()?;
        lock(&self.live).remove(&key);
        live.stop_clock();

        Ok(result)
    }

    async fn persist_with_retry(&self, result: &AttemptResult) -> Result<QuizAttempt, QuizError> {
        let mut failures = 0;
        loop {
            match self.store.persist(result).await {
                Ok(record) => return Ok(record),
                Err(QuizError::PersistenceFailure(msg))
                    if failures < self.settings.persist_max_retries =>
                {
                    failures += 1;
                    tracing::warn!(
                        "Persisting attempt {} of quiz {} failed ({}), retry {}/{}",
                        result.attempt_number,
                        result.quiz_id,
                        msg,
                        failures,
                        self.settings.persist_max_retries
                    );
                    tokio::time::sleep(self.settings.persist_retry_backoff * failures).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
