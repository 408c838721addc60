use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use quest_api::AppState;
use quest_api::state::run_db;

/// Background housekeeping: drops idle rate-limit keys and expired
/// password-reset tokens.
pub async fn run_sweep_loop(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let idle = state.general_limiter.sweep() + state.auth_limiter.sweep();
        if idle > 0 {
            debug!("Sweep: dropped {} idle rate-limit keys", idle);
        }

        match run_db(&state, |db| db.clear_expired_reset_tokens(Utc::now())).await {
            Ok(0) => {}
            Ok(count) => info!("Sweep: cleared {} expired reset tokens", count),
            Err(e) => warn!("Sweep error: {}", e),
        }
    }
}
