//! Archive reader abstraction.

use async_trait::async_trait;

use crate::period::{DateSpec, Period};
use crate::report::Report;
use crate::site::SiteId;

/// Parameters of one numeric archive fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub sites: Vec<SiteId>,
    /// When set, the result is grouped by site even for a single site.
    pub multi_site: bool,
    pub period: Period,
    pub date: DateSpec,
    pub segment: Option<String>,
    pub restrict_to_login: Option<String>,
}

impl ArchiveQuery {
    /// Same query for another date.
    pub fn for_date(&self, date: DateSpec) -> Self {
        Self {
            date,
            ..self.clone()
        }
    }
}

/// Storage collaborator returning archived numeric records.
///
/// The result shape follows the query:
///
/// - multi-site: a [`GroupKind::Site`](crate::report::GroupKind::Site) group
///   with one entry per site, keyed by site id;
/// - multi-period date: a [`GroupKind::Period`](crate::report::GroupKind::Period)
///   group (nested inside the site group when both apply);
/// - otherwise a plain table with one row.
///
/// Every row carries each requested record name as a column.
#[async_trait]
pub trait ArchiveReader: Send + Sync + 'static {
    async fn fetch_numeric(&self, query: &ArchiveQuery, records: &[&str])
        -> anyhow::Result<Report>;
}
