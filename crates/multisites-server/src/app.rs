use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// CORS is open unless `MULTISITES_CORS_ORIGINS` lists origins.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/multisites",
            get(routes::multisites::all_sites_report),
        )
        .route(
            "/api/multisites/{site_id}",
            get(routes::multisites::one_site_report),
        )
        .route(
            "/api/sites",
            get(routes::sites::list_sites).post(routes::sites::create_site),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
