use std::collections::BTreeMap;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::collect::{collect, dedup_by_id};
use crate::db::{persist_rows, RefCache};
use crate::error::{RowError, ScrapeError};
use crate::extract::ScreeningRow;
use crate::fetch::FetchClient;
use crate::venues::venue_spec;

const INTER_VENUE_PAUSE_MS: u64 = 400;

/// Summary returned by every scrape invocation; the CLI prints it as JSON.
#[derive(Serialize)]
pub struct RunSummary {
    pub scraped: usize,
    pub inserted: usize,
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}

/// Run the given venue collectors with a short pause between them, merge and
/// globally dedupe by row id (last observed wins), then call the persistence
/// gateway exactly once with the unique set.
pub async fn run(
    conn: &Connection,
    fetcher: &FetchClient,
    slugs: &[&str],
) -> Result<RunSummary, ScrapeError> {
    let mut counts = BTreeMap::new();
    let mut merged: Vec<ScreeningRow> = Vec::new();

    for (i, slug) in slugs.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(INTER_VENUE_PAUSE_MS)).await;
        }
        let spec = venue_spec(slug)
            .ok_or_else(|| ScrapeError::Config(format!("unknown venue '{slug}'")))?;
        let rows = collect(fetcher, spec).await?;
        info!(venue = slug, rows = rows.len(), "collector finished");
        counts.insert(slug.to_string(), rows.len());
        merged.extend(rows);
    }

    let unique = dedup_by_id(merged);
    let scraped = unique.len();

    // Fresh cache per run: reference lookups must never go stale across runs
    let mut cache = RefCache::new();
    let outcome = persist_rows(conn, &mut cache, &unique);
    info!(scraped, inserted = outcome.written, errors = outcome.errors.len(), "run complete");

    Ok(RunSummary {
        scraped,
        inserted: outcome.written,
        counts,
        errors: outcome.errors,
    })
}
