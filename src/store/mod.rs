// src/store/mod.rs

//! Collaborators of the attempt service, each behind a trait so the engine
//! can run against any backing store.

pub mod entitlement;
pub mod progress;
pub mod question_bank;

pub use entitlement::{EnrollmentGate, EntitlementGate};
pub use progress::{AttemptTally, ProgressStore, SqlProgressStore};
pub use question_bank::{QuestionBank, SqlQuestionBank};
