use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use multisites_server::state::AppState;

/// `multisites health`: container health check. Exit status 0 when the local
/// server answers `GET /health` with 200.
fn run_health_check() -> ! {
    let port = std::env::var("MULTISITES_PORT").unwrap_or_else(|_| "3000".to_string());
    let healthy = ureq::get(&format!("http://127.0.0.1:{port}/health"))
        .timeout(std::time::Duration::from_secs(3))
        .call()
        .is_ok_and(|resp| resp.status() == 200);
    std::process::exit(if healthy { 0 } else { 1 })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multisites=info".parse()?),
        )
        .json()
        .init();

    let cfg = multisites_server::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/multisites.db", cfg.data_dir);
    let db = multisites_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    if cfg.superuser {
        info!("API callers run as super user (MULTISITES_SUPERUSER=true)");
    } else {
        info!("API callers run as the anonymous user");
    }

    let state = Arc::new(AppState::new(db, cfg.clone()));

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            multisites_server::scheduler::run_scheduler_loop(state).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = multisites_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, goals = cfg.goals_enabled, "Multisites listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
