use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use multisites_core::period::{Period, PeriodSpan};
use multisites_duckdb::DuckDbBackend;
use multisites_server::app::build_app;
use multisites_server::config::Config;
use multisites_server::scheduler;
use multisites_server::state::AppState;

fn config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/multisites-test".to_string(),
        duckdb_memory_limit: "1GB".to_string(),
        goals_enabled: false,
        superuser: true,
        cors_origins: vec![],
        digest_login: None,
        digest_interval_seconds: 3600,
    }
}

async fn setup_with(config: Config) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, config));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

async fn setup() -> (Arc<AppState>, axum::Router) {
    setup_with(config()).await
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

async fn get(app: &axum::Router, uri: &str) -> axum::http::Response<Body> {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    app.clone().oneshot(req).await.expect("response")
}

async fn create_site(app: &axum::Router, name: &str) -> i64 {
    let req = Request::builder()
        .method("POST")
        .uri("/api/sites")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "name": name, "main_url": format!("https://{}.example", name.to_lowercase()) })
                .to_string(),
        ))
        .expect("request");
    let res = app.clone().oneshot(req).await.expect("create site");
    assert_eq!(res.status(), StatusCode::CREATED);
    json_body(res).await["data"]["idsite"]
        .as_i64()
        .expect("idsite")
}

async fn record_visits(state: &AppState, idsite: i64, day: &str, visits: f64) {
    let date = chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").expect("date");
    state
        .db
        .record_numeric(
            idsite,
            &PeriodSpan::containing(Period::Day, date),
            None,
            &[("nb_visits", visits), ("nb_actions", visits * 2.0)],
        )
        .await
        .expect("record");
}

#[tokio::test]
async fn health_ok() {
    let (_state, app) = setup().await;
    let res = get(&app, "/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "ok");
}

#[tokio::test]
async fn sites_list_paginates() {
    let (_state, app) = setup().await;
    create_site(&app, "Alpha").await;
    create_site(&app, "Beta").await;

    let res = get(&app, "/api/sites?limit=1&offset=1").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["data"].as_array().expect("array").len(), 1);
    assert_eq!(body["data"][0]["name"], "Beta");
}

#[tokio::test]
async fn create_site_requires_name() {
    let (_state, app) = setup().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/sites")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "  " }).to_string()))
        .expect("request");
    let res = app.clone().oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"]["field"], "name");
}

#[tokio::test]
async fn all_sites_report_json() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    let beta = create_site(&app, "Beta").await;
    create_site(&app, "Idle").await;
    record_visits(&state, alpha, "2024-03-10", 10.0).await;
    record_visits(&state, beta, "2024-03-10", 30.0).await;
    record_visits(&state, alpha, "2024-03-09", 5.0).await;

    let res = get(&app, "/api/multisites?period=day&date=2024-03-10").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let rows = body["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["columns"]["label"], "Beta");
    assert_eq!(rows[0]["metadata"]["idsite"], beta);
    assert_eq!(rows[1]["columns"]["visits_evolution"], 100.0);
    assert_eq!(body["data"]["metadata"]["total_nb_visits"], 40);
    assert_eq!(body["data"]["metadata"]["last_period_date"], "2024-03-09");
}

#[tokio::test]
async fn enhanced_report_keeps_idle_sites() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    create_site(&app, "Idle").await;
    record_visits(&state, alpha, "2024-03-10", 4.0).await;

    let body = json_body(get(&app, "/api/multisites?date=2024-03-10&enhanced=1").await).await;
    let rows = body["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["columns"]["label"], "Idle");
    assert_eq!(rows[1]["columns"]["nb_visits"], 0);
}

#[tokio::test]
async fn pattern_filters_and_empty_match() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    let beta = create_site(&app, "Beta").await;
    record_visits(&state, alpha, "2024-03-10", 1.0).await;
    record_visits(&state, beta, "2024-03-10", 2.0).await;

    let body = json_body(get(&app, "/api/multisites?date=2024-03-10&pattern=alp").await).await;
    let rows = body["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["columns"]["label"], "Alpha");

    let empty =
        json_body(get(&app, "/api/multisites?date=2024-03-10&pattern=nomatch").await).await;
    assert_eq!(empty["data"]["rows"].as_array().expect("rows").len(), 0);
}

#[tokio::test]
async fn multi_period_report_is_grouped_by_period() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    record_visits(&state, alpha, "2024-03-09", 3.0).await;
    record_visits(&state, alpha, "2024-03-10", 6.0).await;

    let body = json_body(
        get(&app, "/api/multisites?period=day&date=2024-03-09,2024-03-10").await,
    )
    .await;
    assert_eq!(body["data"]["group_by"], "period");
    let tables = body["data"]["tables"].as_array().expect("tables");
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[1]["key"], "2024-03-10");
    assert_eq!(tables[1]["report"]["rows"][0]["columns"]["nb_visits"], 6);
    assert_eq!(
        tables[1]["report"]["rows"][0]["columns"]["visits_evolution"],
        100.0
    );
}

#[tokio::test]
async fn one_site_report_and_unknown_site() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    record_visits(&state, alpha, "2024-03-10", 8.0).await;

    let res = get(&app, &format!("/api/multisites/{alpha}?date=2024-03-10")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["data"]["rows"][0]["columns"]["nb_visits"], 8);

    let missing = get(&app, "/api/multisites/999?date=2024-03-10").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_period_is_rejected() {
    let (_state, app) = setup().await;
    let res = get(&app, "/api/multisites?period=decade").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"]["field"], "period");

    let res = get(&app, "/api/multisites?format=xml").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = get(&app, "/api/multisites?period=day&date=2020-01-01,2024-12-31").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"]["field"], "date");
}

#[tokio::test]
async fn csv_export() {
    let (state, app) = setup().await;
    let alpha = create_site(&app, "Alpha").await;
    record_visits(&state, alpha, "2024-03-10", 2.0).await;

    let res = get(&app, "/api/multisites?date=2024-03-10&format=csv").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv; charset=utf-8");
    let bytes = res.into_body().collect().await.expect("body").to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).expect("utf8");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            concat!(
                "nb_visits,nb_actions,nb_pageviews,label,",
                "visits_evolution,actions_evolution,pageviews_evolution,idsite"
            ),
            "2,4,0,Alpha,100,100,0,1",
        ]
    );
}

#[tokio::test]
async fn anonymous_callers_only_see_granted_sites() {
    let mut cfg = config();
    cfg.superuser = false;
    let (state, app) = setup_with(cfg).await;
    let alpha = create_site(&app, "Alpha").await;
    let beta = create_site(&app, "Beta").await;
    record_visits(&state, alpha, "2024-03-10", 1.0).await;
    record_visits(&state, beta, "2024-03-10", 2.0).await;
    state.db.grant_view("anonymous", alpha).await.expect("grant");

    let body = json_body(get(&app, "/api/multisites?date=2024-03-10").await).await;
    let rows = body["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["columns"]["label"], "Alpha");
}

#[tokio::test]
async fn digest_stores_snapshot_for_digest_login() {
    let mut cfg = config();
    cfg.digest_login = Some("reporter".to_string());
    let (state, app) = setup_with(cfg).await;
    let alpha = create_site(&app, "Alpha").await;
    let beta = create_site(&app, "Beta").await;
    let yesterday = (Utc::now().date_naive() - Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();
    record_visits(&state, alpha, &yesterday, 3.0).await;
    record_visits(&state, beta, &yesterday, 9.0).await;
    state.db.grant_view("reporter", beta).await.expect("grant");

    let rows = scheduler::process_once(&state).await.expect("digest");
    assert_eq!(rows, 1);

    let snapshots = state.db.list_snapshots(10).await.expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].login.as_deref(), Some("reporter"));
    assert_eq!(snapshots[0].date, yesterday);
    assert_eq!(snapshots[0].payload["rows"][0]["columns"]["label"], "Beta");
}
