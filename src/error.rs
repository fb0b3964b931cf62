use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy for a scrape run. A page yielding zero rows is not an
/// error; collectors treat it as an empty extraction and move on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Missing or invalid configuration. The only fatal class: checked
    /// before any network activity.
    #[error("configuration error: {0}")]
    Config(String),

    /// Direct fetch failed after retries and the fallback provider.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A collector could not obtain any candidate page links at all.
    #[error("no candidate pages discovered for venue '{0}'")]
    Discovery(String),

    /// Cinema or film lookup/creation failed for one row.
    #[error("reference lookup failed: {0}")]
    ReferenceLookup(String),

    /// Screening write failed for one row.
    #[error("upsert failed: {0}")]
    Upsert(String),
}

/// One failed row inside an otherwise successful persistence batch.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row_id: String,
    pub reason: String,
}
