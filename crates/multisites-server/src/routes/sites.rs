use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use multisites_duckdb::site::CreateSiteParams;

use crate::{error::AppError, state::AppState};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub main_url: Option<String>,
    #[serde(default)]
    pub ecommerce: bool,
    pub group: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListSitesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `POST /api/sites`: register a tracked site.
#[tracing::instrument(skip(state, req))]
pub async fn create_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSiteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidParam {
            field: "name",
            message: "name is required".to_string(),
        });
    }

    let site = state
        .db
        .create_site(CreateSiteParams {
            name: name.to_string(),
            main_url: req.main_url.filter(|u| !u.trim().is_empty()),
            ecommerce: req.ecommerce,
            group: req.group.filter(|g| !g.trim().is_empty()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": site }))))
}

/// `GET /api/sites`: list sites by id.
#[tracing::instrument(skip(state))]
pub async fn list_sites(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListSitesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = q.offset.unwrap_or(0).max(0);
    let (sites, total) = state.db.list_sites(limit, offset).await?;

    Ok(Json(json!({
        "data": sites,
        "pagination": {
            "total": total,
            "limit": limit,
            "offset": offset,
        }
    })))
}
