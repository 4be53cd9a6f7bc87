use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use duckdb::Connection;

use multisites_core::archive::{ArchiveQuery, ArchiveReader};
use multisites_core::period::{Period, PeriodSpan};
use multisites_core::report::{GroupKind, Report, ReportGroup, ReportRow, ReportTable, Value};
use multisites_core::site::SiteId;

use crate::DuckDbBackend;

fn ymd(span: &PeriodSpan) -> (String, String) {
    (
        span.start.format("%Y-%m-%d").to_string(),
        span.end.format("%Y-%m-%d").to_string(),
    )
}

/// Read the requested records of one site over one span into a one-row table.
///
/// Ranges are not archived as such: they sum the day archives they cover.
/// Records with no archive read as 0.
fn read_span(
    conn: &Connection,
    idsite: SiteId,
    span: &PeriodSpan,
    segment: &str,
    records: &[&str],
) -> Result<ReportTable> {
    let (date1, date2) = ymd(span);
    let mut found: HashMap<String, f64> = HashMap::new();

    if span.period == Period::Range {
        let mut stmt = conn.prepare(
            "SELECT name, SUM(value) FROM archive_numeric \
             WHERE idsite = ?1 AND period = 'day' AND date1 >= ?2 AND date2 <= ?3 AND segment = ?4 \
             GROUP BY name",
        )?;
        let rows = stmt.query_map(duckdb::params![idsite, date1, date2, segment], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (name, value) = row?;
            found.insert(name, value);
        }
    } else {
        let mut stmt = conn.prepare(
            "SELECT name, value FROM archive_numeric \
             WHERE idsite = ?1 AND period = ?2 AND date1 = ?3 AND date2 = ?4 AND segment = ?5",
        )?;
        let rows = stmt.query_map(
            duckdb::params![idsite, span.period.as_str(), date1, date2, segment],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;
        for row in rows {
            let (name, value) = row?;
            found.insert(name, value);
        }
    }

    let row = records.iter().fold(ReportRow::new(), |row, record| {
        let value = found.get(*record).copied().unwrap_or(0.0);
        row.with_column(record, Value::from_f64(value))
    });
    let mut table = ReportTable::with_rows(vec![row]);
    table.set_metadata("period", span.period.as_str());
    table.set_metadata("date", span.label());
    Ok(table)
}

impl DuckDbBackend {
    /// Store archived values for one site and span, replacing existing ones.
    pub async fn record_numeric(
        &self,
        idsite: SiteId,
        span: &PeriodSpan,
        segment: Option<&str>,
        values: &[(&str, f64)],
    ) -> Result<()> {
        let (date1, date2) = ymd(span);
        let segment = segment.unwrap_or("");
        let conn = self.conn.lock().await;
        for (name, value) in values {
            conn.execute(
                "INSERT INTO archive_numeric (idsite, period, date1, date2, segment, name, value) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (idsite, period, date1, date2, segment, name) \
                 DO UPDATE SET value = excluded.value",
                duckdb::params![
                    idsite,
                    span.period.as_str(),
                    date1,
                    date2,
                    segment,
                    name,
                    value
                ],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveReader for DuckDbBackend {
    async fn fetch_numeric(&self, query: &ArchiveQuery, records: &[&str]) -> Result<Report> {
        if !query.multi_site && query.sites.len() != 1 {
            return Err(anyhow!(
                "single-site fetch needs exactly one site, got {}",
                query.sites.len()
            ));
        }
        let spans = query.date.sub_periods(query.period);
        let multi_period = query.date.is_multi_period(query.period);
        let segment = query.segment.as_deref().unwrap_or("");

        let conn = self.conn.lock().await;
        let mut per_site = ReportGroup::new(GroupKind::Site);
        for &site in &query.sites {
            let report = if multi_period {
                let mut by_period = ReportGroup::new(GroupKind::Period);
                for span in &spans {
                    by_period.push(
                        span.label(),
                        Report::Plain(read_span(&conn, site, span, segment, records)?),
                    );
                }
                Report::Grouped(by_period)
            } else {
                let span = spans.first().ok_or_else(|| {
                    anyhow!("date {} covers no {} period", query.date, query.period)
                })?;
                Report::Plain(read_span(&conn, site, span, segment, records)?)
            };

            if !query.multi_site {
                return Ok(report);
            }
            per_site.push(site.to_string(), report);
        }
        Ok(Report::Grouped(per_site))
    }
}
