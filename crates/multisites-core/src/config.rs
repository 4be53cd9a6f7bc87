use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    /// Goal tracking is on: revenue (and, in enhanced mode, conversions and
    /// ecommerce) metrics are reported.
    pub goals_enabled: bool,
    /// Treat API callers as super users. Self-hosted single-admin setups.
    pub superuser: bool,
    pub cors_origins: Vec<String>,
    /// Login whose viewable sites the scheduled digest covers.
    pub digest_login: Option<String>,
    pub digest_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("MULTISITES_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("MULTISITES_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("MULTISITES_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            goals_enabled: std::env::var("MULTISITES_GOALS_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            superuser: std::env::var("MULTISITES_SUPERUSER")
                .map(|v| v != "false")
                .unwrap_or(true),
            cors_origins: std::env::var("MULTISITES_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            digest_login: std::env::var("MULTISITES_DIGEST_LOGIN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            digest_interval_seconds: std::env::var("MULTISITES_DIGEST_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.clamp(60, 86_400))
                .unwrap_or(3600),
        })
    }

    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest_interval_seconds)
    }
}
