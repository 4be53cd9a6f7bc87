//! Table merge engine: collapses site-grouped archive results and manages
//! the `label` / `idsite` bookkeeping of report rows.

use crate::error::ReportError;
use crate::report::{
    GroupKind, Report, ReportGroup, ReportRow, ReportTable, Value, IDSITE_METADATA, LABEL_COLUMN,
};
use crate::site::{SiteDirectory, SiteId};

/// Row metadata key for the site's main URL.
pub const MAIN_URL_METADATA: &str = "main_url";

/// Row metadata key for the site's group.
pub const GROUP_METADATA: &str = "group";

/// Collapse a site-grouped result into one row per site.
///
/// Each row gets `label` = site id. When the per-site entries are themselves
/// period groups, the result is a period group whose tables hold one row per
/// site. Period groups wrapping site groups are merged entry by entry.
pub fn merge_multi_site(raw: Report) -> Result<Report, ReportError> {
    let group = match raw {
        Report::Plain(table) => return Ok(Report::Plain(table)),
        Report::Grouped(group) => group,
    };

    if group.kind == GroupKind::Period {
        let mut merged = ReportGroup::new(GroupKind::Period);
        for entry in group.entries {
            merged.push(entry.key, merge_multi_site(entry.report)?);
        }
        return Ok(Report::Grouped(merged));
    }

    let nested = group
        .entries
        .first()
        .is_some_and(|entry| entry.report.is_grouped());

    if !nested {
        let mut result = ReportTable::new();
        for entry in group.entries {
            let Report::Plain(table) = entry.report else {
                return Err(ReportError::MalformedArchive(format!(
                    "site {} mixes grouped and plain results",
                    entry.key
                )));
            };
            if result.metadata.is_empty() {
                result.metadata = table.metadata.clone();
            }
            copy_rows_with_label(&mut result, table, &entry.key);
        }
        return Ok(Report::Plain(result));
    }

    let mut result = ReportGroup::new(GroupKind::Period);
    for entry in group.entries {
        let Report::Grouped(inner) = entry.report else {
            return Err(ReportError::MalformedArchive(format!(
                "site {} mixes grouped and plain results",
                entry.key
            )));
        };
        for inner_entry in inner.entries {
            let Report::Plain(table) = inner_entry.report else {
                return Err(ReportError::MalformedArchive(format!(
                    "site {} period {} is nested more than two levels",
                    entry.key, inner_entry.key
                )));
            };
            let position = result.entries.iter().position(|e| e.key == inner_entry.key);
            let position = match position {
                Some(idx) => idx,
                None => {
                    let mut fresh = ReportTable::new();
                    fresh.metadata = table.metadata.clone();
                    result.push(inner_entry.key.clone(), Report::Plain(fresh));
                    result.entries.len() - 1
                }
            };
            if let Report::Plain(target) = &mut result.entries[position].report {
                copy_rows_with_label(target, table, &entry.key);
            }
        }
    }
    Ok(Report::Grouped(result))
}

fn copy_rows_with_label(target: &mut ReportTable, source: ReportTable, site_key: &str) {
    let label = site_key
        .parse::<SiteId>()
        .map(Value::Int)
        .unwrap_or_else(|_| Value::Text(site_key.to_string()));
    for mut row in source.rows {
        row.set_column(LABEL_COLUMN, label.clone());
        target.rows.push(row);
    }
}

/// Label the only row of a single-site, non-grouped result with the site id.
pub fn attach_site_label(report: &mut Report, sites: &[SiteId]) {
    let [site] = sites else {
        return;
    };
    if let Report::Plain(table) = report {
        if let Some(row) = table.rows.first_mut() {
            row.set_column(LABEL_COLUMN, Value::Int(*site));
        }
    }
}

/// Make sure every requested site has a row.
///
/// Multi-site tables get a zero row (labelled with the site id) per missing
/// site. Single-site tables only get a zero row when they are empty.
pub fn add_missing_sites(
    report: &mut Report,
    sites: &[SiteId],
    records: &[&str],
    multi_site: bool,
) {
    for table in report.tables_mut() {
        if multi_site {
            for &site in sites {
                if table.row_by_label(&Value::Int(site)).is_none() {
                    let mut row = zero_row(records);
                    row.set_column(LABEL_COLUMN, Value::Int(site));
                    table.rows.push(row);
                }
            }
        } else if table.is_empty() {
            table.rows.push(zero_row(records));
        }
    }
}

fn zero_row(records: &[&str]) -> ReportRow {
    records
        .iter()
        .fold(ReportRow::new(), |row, record| row.with_column(record, 0))
}

/// Copy each row's `label` (still the site id) into the `idsite` metadata.
///
/// Must run before [`finalize_labels`], which overwrites `label`.
pub fn move_idsite_to_metadata(report: &mut Report) {
    for table in report.tables_mut() {
        for row in table.rows.iter_mut() {
            let Some(id) = row.label().and_then(Value::as_i64) else {
                continue;
            };
            row.set_metadata(IDSITE_METADATA, Value::Int(id));
        }
    }
}

/// Attach `main_url` and `group` row metadata for every row with an `idsite`.
pub async fn attach_site_metadata(
    report: &mut Report,
    directory: &dyn SiteDirectory,
) -> Result<(), ReportError> {
    for table in report.tables_mut() {
        for row in table.rows.iter_mut() {
            let Some(id) = row.metadata(IDSITE_METADATA).and_then(Value::as_i64) else {
                continue;
            };
            let Some(site) = directory.site(id).await.map_err(ReportError::SiteLookup)? else {
                continue;
            };
            if let Some(url) = site.main_url {
                row.set_metadata(MAIN_URL_METADATA, url);
            }
            if let Some(group) = site.group {
                row.set_metadata(GROUP_METADATA, group);
            }
        }
    }
    Ok(())
}

/// Replace site ids in `label` with display names (multi-site), or drop the
/// `label` column altogether (single-site).
pub async fn finalize_labels(
    report: &mut Report,
    multi_site: bool,
    directory: &dyn SiteDirectory,
) -> Result<(), ReportError> {
    for table in report.tables_mut() {
        for row in table.rows.iter_mut() {
            if !multi_site {
                row.remove_column(LABEL_COLUMN);
                continue;
            }
            let Some(id) = row.label().and_then(Value::as_i64) else {
                continue;
            };
            let name = directory
                .display_name(id)
                .await
                .map_err(ReportError::SiteLookup)?;
            row.set_column(LABEL_COLUMN, name);
        }
    }
    Ok(())
}
