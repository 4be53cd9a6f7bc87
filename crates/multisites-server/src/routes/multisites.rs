use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use multisites_core::period::{DateSpec, Period};
use multisites_core::report::{Report, ReportRow, Value, IDSITE_METADATA};
use multisites_core::site::SiteId;
use multisites_core::ReportRequest;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub period: Option<String>,
    pub date: Option<String>,
    pub segment: Option<String>,
    pub restrict_to_login: Option<String>,
    pub enhanced: Option<String>,
    pub pattern: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Csv,
}

impl ReportQuery {
    fn request(&self) -> Result<ReportRequest, AppError> {
        let period = Period::parse(self.period.as_deref().unwrap_or("day")).map_err(|e| {
            AppError::InvalidParam {
                field: "period",
                message: e.to_string(),
            }
        })?;
        let today = Utc::now().date_naive();
        let date = DateSpec::parse(self.date.as_deref().unwrap_or("today"), period, today)
            .map_err(|e| AppError::InvalidParam {
                field: "date",
                message: e.to_string(),
            })?;

        let mut request = ReportRequest::new(period, date)
            .enhanced(matches!(self.enhanced.as_deref(), Some("1" | "true")));
        request.segment = self.segment.clone().filter(|s| !s.is_empty());
        request.restrict_to_login = self.restrict_to_login.clone().filter(|s| !s.is_empty());
        Ok(request)
    }

    fn format(&self) -> Result<Format, AppError> {
        match self.format.as_deref() {
            None | Some("json") => Ok(Format::Json),
            Some("csv") => Ok(Format::Csv),
            Some(other) => Err(AppError::InvalidParam {
                field: "format",
                message: format!("unsupported format: {other}; expected 'json' or 'csv'"),
            }),
        }
    }
}

/// `GET /api/multisites`: key metrics for every site in scope.
#[tracing::instrument(skip(state))]
pub async fn all_sites_report(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let request = q.request()?;
    let format = q.format()?;
    let report = state
        .reports
        .get_all_sites_report(&state.caller(), &request, q.pattern.as_deref())
        .await?;
    render(report, format, "all-sites", &request)
}

/// `GET /api/multisites/{site_id}`: key metrics for one site.
#[tracing::instrument(skip(state))]
pub async fn one_site_report(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<SiteId>,
    Query(q): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let request = q.request()?;
    let format = q.format()?;
    if state.db.get_site(site_id).await?.is_none() {
        return Err(AppError::NotFound("Site not found".to_string()));
    }
    let report = state
        .reports
        .get_one_site_report(&state.caller(), site_id, &request)
        .await?;
    render(report, format, &format!("site-{site_id}"), &request)
}

fn render(
    report: Report,
    format: Format,
    name: &str,
    request: &ReportRequest,
) -> Result<Response, AppError> {
    match format {
        Format::Json => Ok(Json(json!({ "data": report })).into_response()),
        Format::Csv => {
            let filename = format!("{name}-{}-{}.csv", request.period, request.date)
                .replace(',', "_");
            let csv_bytes = build_csv(&report)?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                )
                .body(axum::body::Body::from(csv_bytes))
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
        }
    }
}

/// Sanitize a CSV text cell against formula injection.
///
/// Spreadsheet apps interpret values that begin with `=`, `+`, `-`, `@`,
/// TAB, or CR as formulas. A leading single quote makes them literal.
fn sanitize_csv_field(val: &str) -> Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        Cow::Owned(format!("'{val}"))
    } else {
        Cow::Borrowed(val)
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::Text(s)) => sanitize_csv_field(s).into_owned(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Rows of every plain table, each with the `/`-joined group keys leading to it.
fn flatten<'a>(
    report: &'a Report,
    key: Option<&str>,
    out: &mut Vec<(Option<String>, &'a ReportRow)>,
) {
    match report {
        Report::Plain(table) => {
            out.extend(table.rows.iter().map(|row| (key.map(str::to_string), row)));
        }
        Report::Grouped(group) => {
            for entry in &group.entries {
                let nested = match key {
                    Some(prefix) => format!("{prefix}/{}", entry.key),
                    None => entry.key.clone(),
                };
                flatten(&entry.report, Some(&nested), out);
            }
        }
    }
}

fn build_csv(report: &Report) -> anyhow::Result<Vec<u8>> {
    let mut rows = Vec::new();
    flatten(report, None, &mut rows);

    let mut columns: Vec<&str> = Vec::new();
    for (_, row) in &rows {
        for name in row.columns.names() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut wtr = csv::Writer::from_writer(Vec::with_capacity(rows.len().saturating_mul(128)));

    let mut header: Vec<&str> = Vec::with_capacity(columns.len() + 2);
    if report.is_grouped() {
        header.push("key");
    }
    header.extend(columns.iter().copied());
    header.push(IDSITE_METADATA);
    wtr.write_record(&header)
        .map_err(|e| anyhow::anyhow!("csv write_record failed: {e}"))?;

    for (key, row) in &rows {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if report.is_grouped() {
            record.push(sanitize_csv_field(key.as_deref().unwrap_or("")).into_owned());
        }
        record.extend(columns.iter().map(|name| csv_cell(row.column(name))));
        record.push(csv_cell(row.metadata(IDSITE_METADATA)));
        wtr.write_record(&record)
            .map_err(|e| anyhow::anyhow!("csv write_record failed: {e}"))?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
}
