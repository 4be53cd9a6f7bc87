//! Totals and period-over-period evolution.
//!
//! Plain and grouped reports go through the same code: shapes are checked
//! once, then current and past tables are paired by position and handled by
//! the plain-table routines.

use crate::catalog::MetricCatalog;
use crate::error::ReportError;
use crate::report::{Report, ReportRow, ReportTable, Value};

/// Percentage change from `past` to `current`, rounded to one decimal.
///
/// Growth from zero is reported as 100, no change as 0.
pub fn evolution_percent(current: f64, past: f64) -> f64 {
    let delta = current - past;
    let evolution = if delta == 0.0 {
        0.0
    } else if past == 0.0 {
        100.0
    } else {
        delta / past * 100.0
    };
    (evolution * 10.0).round() / 10.0
}

/// Verify `current` and `past` have the same shape at every level.
pub fn check_shapes(current: &Report, past: &Report) -> Result<(), ReportError> {
    match (current, past) {
        (Report::Plain(_), Report::Plain(_)) => Ok(()),
        (Report::Grouped(cur), Report::Grouped(prev)) => {
            if prev.entries.len() < cur.entries.len() {
                return Err(ReportError::ShapeMismatch {
                    current: "grouped",
                    past: "shorter group",
                });
            }
            cur.entries
                .iter()
                .zip(prev.entries.iter())
                .try_for_each(|(c, p)| check_shapes(&c.report, &p.report))
        }
        _ => Err(ReportError::ShapeMismatch {
            current: current.shape_name(),
            past: past.shape_name(),
        }),
    }
}

/// Pair the plain tables of two same-shaped reports by position.
fn zip_tables<'a>(
    current: &'a mut Report,
    past: &'a Report,
) -> Result<Vec<(&'a mut ReportTable, &'a ReportTable)>, ReportError> {
    check_shapes(current, past)?;
    let past_tables = past.tables();
    Ok(current.tables_mut().into_iter().zip(past_tables).collect())
}

/// Add one evolution column per metric to every row of `current`.
///
/// Rows are matched to past rows by `label`; rows without a label use the
/// past row at the same position. A missing past row counts as zero.
pub fn calculate_evolution(
    current: &mut Report,
    past: &Report,
    catalog: &MetricCatalog,
) -> Result<(), ReportError> {
    for (table, past_table) in zip_tables(current, past)? {
        table_evolution(table, past_table, catalog);
    }
    Ok(())
}

fn table_evolution(table: &mut ReportTable, past: &ReportTable, catalog: &MetricCatalog) {
    for (idx, row) in table.rows.iter_mut().enumerate() {
        let past_row = match row.label() {
            Some(label) => past.row_by_label(label),
            None => past.rows.get(idx),
        };
        for metric in catalog.iter() {
            let current_value = numeric(Some(&*row), metric.record_name);
            let past_value = numeric(past_row, metric.record_name);
            row.set_column(
                metric.evolution_column,
                Value::Float(evolution_percent(current_value, past_value)),
            );
        }
    }
}

fn numeric(row: Option<&ReportRow>, column: &str) -> f64 {
    row.and_then(|r| r.column(column))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Sum of each metric's record over the rows of one table, in catalog order.
pub fn table_totals(
    table: &ReportTable,
    catalog: &MetricCatalog,
) -> Vec<(&'static str, Value)> {
    catalog
        .iter()
        .map(|metric| {
            let total = table
                .rows
                .iter()
                .filter_map(|row| row.column(metric.record_name))
                .fold(Value::Int(0), |acc, v| acc.add(v));
            (metric.name, total)
        })
        .collect()
}

/// Write `total_<metric>` metadata on every table of the report.
pub fn compute_totals(report: &mut Report, catalog: &MetricCatalog) {
    for table in report.tables_mut() {
        for (name, total) in table_totals(table, catalog) {
            table.set_metadata(&format!("total_{name}"), total);
        }
    }
}

/// Evolution of the totals, plus the past totals for display.
///
/// Both reports must already carry `total_*` metadata.
pub fn compute_totals_evolution(
    current: &mut Report,
    past: &Report,
    catalog: &MetricCatalog,
) -> Result<(), ReportError> {
    for (table, past_table) in zip_tables(current, past)? {
        for metric in catalog.iter() {
            let total_key = metric.total_key();
            let total = table.metadata(&total_key).cloned().unwrap_or(Value::Int(0));
            let last_total = past_table
                .metadata(&total_key)
                .cloned()
                .unwrap_or(Value::Int(0));
            let evolution = evolution_percent(
                total.as_f64().unwrap_or(0.0),
                last_total.as_f64().unwrap_or(0.0),
            );
            table.set_metadata(&metric.last_period_total_key(), last_total);
            table.set_metadata(&metric.total_evolution_key(), Value::Float(evolution));
        }
    }
    Ok(())
}
