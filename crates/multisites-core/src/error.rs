use thiserror::Error;

/// Failures of the report pipeline.
///
/// An empty site set and a missing prior period are not errors: the first
/// yields an empty report, the second a report without evolution columns.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Current and past data have different shapes. Always a caller defect.
    #[error("shape mismatch: expected past data to be {current}, got {past}")]
    ShapeMismatch {
        current: &'static str,
        past: &'static str,
    },

    /// The archive reader returned a result the merge stage cannot interpret.
    #[error("malformed archive result: {0}")]
    MalformedArchive(String),

    #[error("archive unavailable: {0}")]
    ArchiveUnavailable(#[source] anyhow::Error),

    #[error("site lookup failed: {0}")]
    SiteLookup(#[source] anyhow::Error),
}
