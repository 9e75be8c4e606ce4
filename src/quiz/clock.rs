// src/quiz/clock.rs

use std::{future::Future, ops::ControlFlow, time::Duration};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

/// Wall-clock period of one countdown step.
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { remaining: u64 },
    /// Reported exactly once, on the step that reaches zero.
    Expired,
    /// Untimed, stopped, or already expired.
    Stopped,
}

/// Remaining-time counter of one attempt.
///
/// Owned by the session and only advanced under the session's lock, so a
/// tick and a submit can never interleave.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: Option<u64>,
    fired: bool,
    stopped: bool,
}

impl Countdown {
    pub fn new(limit_secs: Option<u64>) -> Self {
        Self {
            remaining: limit_secs,
            fired: false,
            stopped: false,
        }
    }

    pub fn is_timed(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Discards any pending step. Idempotent.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn tick(&mut self) -> Tick {
        if self.stopped || self.fired {
            return Tick::Stopped;
        }
        let Some(remaining) = self.remaining else {
            return Tick::Stopped;
        };

        let remaining = remaining.saturating_sub(1);
        self.remaining = Some(remaining);
        if remaining == 0 {
            self.fired = true;
            Tick::Expired
        } else {
            Tick::Running { remaining }
        }
    }
}

/// Background task that drives a countdown at a fixed period.
///
/// The callback runs once per period until it returns `Break` or the clock is
/// cancelled. Dropping the clock cancels it.
#[derive(Debug)]
pub struct AttemptClock {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AttemptClock {
    pub fn spawn<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = interval.tick() => {
                        if on_tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancel: Some(cancel),
            task,
        }
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for AttemptClock {
    fn drop(&mut self) {
        self.stop();
    }
}
