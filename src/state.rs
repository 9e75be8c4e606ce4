use std::sync::Arc;

use crate::{config::Config, quiz::AttemptService};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub attempts: Arc<AttemptService>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<AttemptService> {
    fn from_ref(state: &AppState) -> Self {
        state.attempts.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
