use std::sync::Arc;

use tracing::{error, info};

use crate::state::AppState;

pub mod digest;

/// Run one digest pass. Returns the number of rows in the stored report.
pub async fn process_once(state: &Arc<AppState>) -> anyhow::Result<usize> {
    digest::run_daily_digest(state).await
}

pub async fn run_scheduler_loop(state: Arc<AppState>) {
    let every = state.config.digest_interval();
    info!(
        interval_seconds = every.as_secs(),
        "Digest scheduler started"
    );
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = process_once(&state).await {
            error!(error = %err, "digest scheduler iteration failed");
        }
    }
}
