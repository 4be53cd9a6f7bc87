use std::sync::Arc;

use multisites_core::site::Caller;
use multisites_core::MultiSites;
use multisites_duckdb::DuckDbBackend;

use crate::config::Config;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. It is also the archive reader and site
    /// collaborator behind [`AppState::reports`].
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    pub reports: MultiSites,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        let reports = MultiSites::new(
            db.clone(),
            db.clone(),
            db.clone(),
            config.goals_enabled,
        );
        Self {
            db,
            config: Arc::new(config),
            reports,
        }
    }

    /// Caller identity for interactive API requests.
    ///
    /// With `MULTISITES_SUPERUSER=false` requests run as the anonymous user.
    pub fn caller(&self) -> Caller {
        if self.config.superuser {
            Caller::super_user()
        } else {
            Caller::default()
        }
    }
}
