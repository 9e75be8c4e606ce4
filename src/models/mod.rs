// src/models/mod.rs

pub mod attempt;
pub mod progress;
pub mod question;
pub mod quiz;
