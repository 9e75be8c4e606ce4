// src/quiz/mod.rs

//! The assessment engine: grading, the per-attempt clock, the attempt state
//! machine and the service that runs live attempts.

pub mod clock;
pub mod scoring;
pub mod service;
pub mod session;

pub use service::{AttemptService, EngineSettings};
pub use session::{AttemptKey, AttemptSession};
