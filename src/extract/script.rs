use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{booking_anchor, page_title, ScreeningRow};
use crate::timeparse::to_utc;

static START_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:startDate|start_date|startTime)"\s*:\s*"([^"]+)""#).unwrap());
static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});

/// Strategy 3: regex recovery from inline script bodies. Looks for explicit
/// start-date keys first, then bare ISO-like fragments, pairing each found
/// instant with the page-level title. No title, no rows.
pub fn extract(html: &str, url: &str, venue: &str) -> Vec<ScreeningRow> {
    let doc = Html::parse_document(html);
    let Some(title) = page_title(&doc) else {
        return Vec::new();
    };
    let Ok(sel) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut instants = Vec::new();
    let mut seen = HashSet::new();

    for el in doc.select(&sel) {
        // Structured metadata scripts belong to strategy 1
        if el.value().attr("type") == Some("application/ld+json") {
            continue;
        }
        let body: String = el.text().collect();
        if body.trim().is_empty() {
            continue;
        }

        let mut found_keyed = false;
        for caps in START_KEY_RE.captures_iter(&body) {
            if let Some(dt) = to_utc(&caps[1]) {
                found_keyed = true;
                if seen.insert(dt) {
                    instants.push(dt);
                }
            }
        }
        if found_keyed {
            continue;
        }

        for m in ISO_RE.find_iter(&body) {
            if let Some(dt) = to_utc(m.as_str()) {
                if seen.insert(dt) {
                    instants.push(dt);
                }
            }
        }
    }

    let booking = booking_anchor(&doc, url).unwrap_or_else(|| url.to_string());
    instants
        .into_iter()
        .map(|start_at| ScreeningRow::new(venue, &title, start_at, booking.clone(), url))
        .collect()
}
