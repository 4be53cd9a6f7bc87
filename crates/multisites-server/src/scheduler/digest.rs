use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use multisites_core::period::{DateSpec, Period};
use multisites_core::site::Caller;
use multisites_core::ReportRequest;

use crate::state::AppState;

/// Build yesterday's all-sites day report and store it as a snapshot.
///
/// Runs as a scheduled super user, so only the sites viewable by the
/// configured digest login (anonymous when unset) are covered.
pub async fn run_daily_digest(state: &Arc<AppState>) -> anyhow::Result<usize> {
    let login = state.config.digest_login.clone();
    let caller = Caller {
        login: login.clone(),
        ..Caller::super_user()
    }
    .scheduled();

    let date = DateSpec::parse("yesterday", Period::Day, Utc::now().date_naive())?;
    let request = ReportRequest::new(Period::Day, date.clone());
    let report = state
        .reports
        .get_all_sites_report(&caller, &request, None)
        .await?;
    let rows = report.row_count();

    let payload = serde_json::to_value(&report)?;
    let snapshot_id = state
        .db
        .save_snapshot(
            login.as_deref(),
            Period::Day.as_str(),
            &date.to_string(),
            &payload,
        )
        .await?;

    info!(
        snapshot_id = %snapshot_id,
        login = login.as_deref().unwrap_or("anonymous"),
        date = %date,
        rows,
        "Daily digest stored"
    );
    Ok(rows)
}
