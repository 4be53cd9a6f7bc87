//! Multi-site analytics aggregation: per-site archive data merged into one
//! report with totals and period-over-period evolution.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod evolution;
pub mod merge;
pub mod period;
pub mod pipeline;
pub mod report;
pub mod site;

pub use error::ReportError;
pub use pipeline::{MultiSites, ReportRequest};
