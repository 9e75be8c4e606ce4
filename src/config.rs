// src/config.rs

use std::{env, net::SocketAddr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;

use crate::models::progress::ProgressPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    /// How many times a failed persistence write is retried before it is surfaced.
    pub persist_max_retries: u32,
    pub persist_retry_backoff: Duration,
    pub progress_policy: ProgressPolicy,
    /// Untimed attempts untouched for this long are released; `None` keeps them.
    pub session_idle_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://quiz-engine.db".to_string());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parse_var("BIND_ADDR", "0.0.0.0:3000")?;
        let persist_max_retries = parse_var("PERSIST_MAX_RETRIES", "3")?;
        let backoff_ms: u64 = parse_var("PERSIST_RETRY_BACKOFF_MS", "200")?;
        let progress_policy = parse_var("PROGRESS_POLICY", "best")?;
        let idle_secs: u64 = parse_var("SESSION_IDLE_TIMEOUT_SECS", "7200")?;

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            persist_max_retries,
            persist_retry_backoff: Duration::from_millis(backoff_ms),
            progress_policy,
            session_idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
