//! The all-websites report pipeline.
//!
//! Stages run in a fixed order: resolve sites, scope them, fetch and merge
//! current data, totals, evolution against the prior period (when one
//! exists), ecommerce stripping, id/label bookkeeping, column rename, sort
//! and zero-visit filtering.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::archive::{ArchiveQuery, ArchiveReader};
use crate::catalog::{MetricCatalog, NB_VISITS};
use crate::error::ReportError;
use crate::evolution::{calculate_evolution, compute_totals, compute_totals_evolution};
use crate::merge::{
    add_missing_sites, attach_site_label, attach_site_metadata, finalize_labels,
    merge_multi_site, move_idsite_to_metadata,
};
use crate::period::{CalendarPeriodMath, DateSpec, Period, PeriodMath};
use crate::report::{Report, ReportRow, Value};
use crate::site::{
    prepare_site_context, resolve_sites, Caller, SiteDirectory, SiteId, SiteSearch, SiteSet,
};

/// Table metadata key holding the prior period's date, when it is a single date.
pub const LAST_PERIOD_DATE_METADATA: &str = "last_period_date";

/// Options shared by the all-sites and one-site reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub period: Period,
    pub date: DateSpec,
    pub segment: Option<String>,
    pub restrict_to_login: Option<String>,
    pub enhanced: bool,
}

impl ReportRequest {
    pub fn new(period: Period, date: DateSpec) -> Self {
        Self {
            period,
            date,
            segment: None,
            restrict_to_login: None,
            enhanced: false,
        }
    }

    pub fn enhanced(mut self, enhanced: bool) -> Self {
        self.enhanced = enhanced;
        self
    }
}

/// Report service wired to its storage and site collaborators.
#[derive(Clone)]
pub struct MultiSites {
    archive: Arc<dyn ArchiveReader>,
    search: Arc<dyn SiteSearch>,
    directory: Arc<dyn SiteDirectory>,
    periods: Arc<dyn PeriodMath>,
    goals_enabled: bool,
}

impl MultiSites {
    pub fn new(
        archive: Arc<dyn ArchiveReader>,
        search: Arc<dyn SiteSearch>,
        directory: Arc<dyn SiteDirectory>,
        goals_enabled: bool,
    ) -> Self {
        Self {
            archive,
            search,
            directory,
            periods: Arc::new(CalendarPeriodMath),
            goals_enabled,
        }
    }

    pub fn with_period_math(mut self, periods: Arc<dyn PeriodMath>) -> Self {
        self.periods = periods;
        self
    }

    pub fn catalog(&self, enhanced: bool) -> MetricCatalog {
        MetricCatalog::build(enhanced, self.goals_enabled)
    }

    /// Report over every site matching `pattern` (all sites when `None`).
    ///
    /// A pattern that matches nothing yields an empty report.
    #[tracing::instrument(
        skip(self, caller, request),
        fields(period = %request.period, date = %request.date)
    )]
    pub async fn get_all_sites_report(
        &self,
        caller: &Caller,
        request: &ReportRequest,
        pattern: Option<&str>,
    ) -> Result<Report, ReportError> {
        let sites = resolve_sites(self.search.as_ref(), pattern)
            .await
            .map_err(ReportError::SiteLookup)?;
        if sites.is_empty() {
            debug!("pattern matched no site, returning empty report");
            return Ok(Report::empty());
        }
        self.build_report(caller, &sites, request, true).await
    }

    /// Report for a single site. Zero-visit rows are always kept.
    #[tracing::instrument(
        skip(self, caller, request),
        fields(period = %request.period, date = %request.date)
    )]
    pub async fn get_one_site_report(
        &self,
        caller: &Caller,
        site_id: SiteId,
        request: &ReportRequest,
    ) -> Result<Report, ReportError> {
        self.build_report(caller, &SiteSet::Only(vec![site_id]), request, false)
            .await
    }

    async fn build_report(
        &self,
        caller: &Caller,
        sites: &SiteSet,
        request: &ReportRequest,
        multi_site: bool,
    ) -> Result<Report, ReportError> {
        let directory = self.directory.as_ref();
        let context = prepare_site_context(
            directory,
            sites,
            request.restrict_to_login.as_deref(),
            caller,
        )
        .await
        .map_err(ReportError::SiteLookup)?;
        if context.sites.is_empty() {
            debug!("no site in scope for caller, returning empty report");
            return Ok(Report::empty());
        }

        let catalog = self.catalog(request.enhanced);
        let records = catalog.record_names();
        let query = ArchiveQuery {
            sites: context.sites,
            multi_site,
            period: request.period,
            date: request.date.clone(),
            segment: request.segment.clone(),
            restrict_to_login: request.restrict_to_login.clone(),
        };

        let mut report = self.fetch_merged(&query, &records).await?;
        compute_totals(&mut report, &catalog);

        match self.periods.prior_period(request.period, &request.date) {
            Ok(prior) => {
                let mut past = self
                    .fetch_merged(&query.for_date(prior.date), &records)
                    .await?;
                compute_totals(&mut past, &catalog);
                calculate_evolution(&mut report, &past, &catalog)?;
                compute_totals_evolution(&mut report, &past, &catalog)?;
                if let Some(last) = prior.last_date {
                    for table in report.tables_mut() {
                        table.set_metadata(LAST_PERIOD_DATE_METADATA, last.to_string());
                    }
                }
            }
            Err(reason) => debug!(%reason, "evolution skipped"),
        }

        if request.enhanced {
            let fallback = match query.sites.as_slice() {
                [only] if !multi_site => Some(*only),
                _ => None,
            };
            strip_ecommerce_columns(&mut report, &catalog, directory, fallback).await?;
        }

        move_idsite_to_metadata(&mut report);
        attach_site_metadata(&mut report, directory).await?;
        finalize_labels(&mut report, multi_site, directory).await?;
        rename_columns(&mut report, &catalog);
        sort_rows_desc(&mut report, NB_VISITS);
        if multi_site && !request.enhanced {
            remove_zero_rows(&mut report, NB_VISITS);
        }

        debug!(rows = report.row_count(), "report built");
        Ok(report)
    }

    async fn fetch_merged(
        &self,
        query: &ArchiveQuery,
        records: &[&str],
    ) -> Result<Report, ReportError> {
        let raw = self
            .archive
            .fetch_numeric(query, records)
            .await
            .map_err(ReportError::ArchiveUnavailable)?;
        let mut report = if query.multi_site {
            merge_multi_site(raw)?
        } else {
            raw
        };
        add_missing_sites(&mut report, &query.sites, records, query.multi_site);
        if !query.multi_site {
            attach_site_label(&mut report, &query.sites);
        }
        Ok(report)
    }
}

/// Drop ecommerce metric and evolution columns from rows of sites without
/// ecommerce. Rows without a `label` use `fallback` as their site.
pub async fn strip_ecommerce_columns(
    report: &mut Report,
    catalog: &MetricCatalog,
    directory: &dyn SiteDirectory,
    fallback: Option<SiteId>,
) -> Result<(), ReportError> {
    if catalog.ecommerce().next().is_none() {
        return Ok(());
    }
    let mut enabled: HashMap<SiteId, bool> = HashMap::new();
    for table in report.tables_mut() {
        for row in table.rows.iter_mut() {
            let Some(site) = row.label().and_then(Value::as_i64).or(fallback) else {
                continue;
            };
            let ecommerce = match enabled.get(&site) {
                Some(flag) => *flag,
                None => {
                    let flag = directory
                        .is_ecommerce_enabled(site)
                        .await
                        .map_err(ReportError::SiteLookup)?;
                    enabled.insert(site, flag);
                    flag
                }
            };
            if ecommerce {
                continue;
            }
            for metric in catalog.ecommerce() {
                row.remove_column(metric.record_name);
                row.remove_column(metric.evolution_column);
            }
        }
    }
    Ok(())
}

/// Rename archive record columns to public metric names.
pub fn rename_columns(report: &mut Report, catalog: &MetricCatalog) {
    for table in report.tables_mut() {
        for row in table.rows.iter_mut() {
            for metric in catalog.iter() {
                row.columns.rename(metric.record_name, metric.name);
            }
        }
    }
}

/// Stable descending sort on `column`. Rows lacking the column go last.
pub fn sort_rows_desc(report: &mut Report, column: &str) {
    for table in report.tables_mut() {
        table
            .rows
            .sort_by(|a, b| compare_desc(a.column(column), b.column(column)));
    }
}

fn compare_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            _ => b.to_string().cmp(&a.to_string()),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Delete rows whose `column` is exactly zero. Rows lacking it are kept.
pub fn remove_zero_rows(report: &mut Report, column: &str) {
    for table in report.tables_mut() {
        table.rows.retain(|row| !is_zero(row, column));
    }
}

fn is_zero(row: &ReportRow, column: &str) -> bool {
    row.column(column).is_some_and(Value::is_zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportTable;

    fn visits_table(values: &[(i64, Option<i64>)]) -> Report {
        Report::Plain(ReportTable::with_rows(
            values
                .iter()
                .map(|(site, visits)| {
                    let row = ReportRow::new().with_column("label", *site);
                    match visits {
                        Some(v) => row.with_column(NB_VISITS, *v),
                        None => row,
                    }
                })
                .collect(),
        ))
    }

    fn labels(report: &Report) -> Vec<i64> {
        report
            .as_table()
            .expect("plain")
            .rows
            .iter()
            .filter_map(|r| r.label().and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut report = visits_table(&[
            (1, Some(3)),
            (2, Some(9)),
            (3, Some(3)),
            (4, None),
            (5, Some(10)),
        ]);
        sort_rows_desc(&mut report, NB_VISITS);
        assert_eq!(labels(&report), vec![5, 2, 1, 3, 4]);
    }

    #[test]
    fn only_exact_zero_rows_removed() {
        let mut report = visits_table(&[(1, Some(0)), (2, Some(4)), (3, None)]);
        remove_zero_rows(&mut report, NB_VISITS);
        assert_eq!(labels(&report), vec![2, 3]);
    }

    #[test]
    fn rename_keeps_evolution_columns() {
        let catalog = MetricCatalog::build(false, false);
        let mut report = Report::Plain(ReportTable::with_rows(vec![ReportRow::new()
            .with_column("Actions_nb_pageviews", 4)
            .with_column("pageviews_evolution", 12.5)]));
        rename_columns(&mut report, &catalog);
        let row = &report.as_table().expect("plain").rows[0];
        assert_eq!(row.column("nb_pageviews"), Some(&Value::Int(4)));
        assert!(row.column("Actions_nb_pageviews").is_none());
        assert_eq!(row.column("pageviews_evolution"), Some(&Value::Float(12.5)));
    }
}
