use std::sync::Arc;

use quest_db::Database;
use quest_gateway::Dispatcher;

use crate::config::AppConfig;
use crate::error::ApiResult;
use crate::security::rate_limit::RateLimiter;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: AppConfig,
    pub tokens: TokenService,
    pub dispatcher: Dispatcher,
    pub general_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
}

impl AppStateInner {
    /// Wire up the shared services for one process.
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            tokens: TokenService::from_config(&config),
            general_limiter: Arc::new(RateLimiter::general(&config)),
            auth_limiter: Arc::new(RateLimiter::auth()),
            dispatcher: Dispatcher::new(),
            db,
            config,
        }
    }

    pub fn into_state(self) -> AppState {
        Arc::new(self)
    }
}

/// Run a blocking database call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {e}"))?;
    Ok(result?)
}
