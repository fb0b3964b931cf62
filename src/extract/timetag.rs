use std::collections::HashSet;

use scraper::{Html, Selector};

use super::{booking_anchor, page_title, ScreeningRow};
use crate::timeparse::to_utc;

/// Strategy 4: semantic time markup. Any element exposing a machine-readable
/// datetime attribute, paired with the page-level title and an anchor-text
/// booking heuristic. Last resort before giving up on a page.
pub fn extract(html: &str, url: &str, venue: &str) -> Vec<ScreeningRow> {
    let doc = Html::parse_document(html);
    let Some(title) = page_title(&doc) else {
        return Vec::new();
    };
    let Ok(sel) = Selector::parse("time[datetime], [data-datetime]") else {
        return Vec::new();
    };

    let mut instants = Vec::new();
    let mut seen = HashSet::new();
    for el in doc.select(&sel) {
        let attr = el
            .value()
            .attr("datetime")
            .or_else(|| el.value().attr("data-datetime"));
        if let Some(dt) = attr.map(str::trim).and_then(to_utc) {
            if seen.insert(dt) {
                instants.push(dt);
            }
        }
    }

    let booking = booking_anchor(&doc, url).unwrap_or_else(|| url.to_string());
    instants
        .into_iter()
        .map(|start_at| ScreeningRow::new(venue, &title, start_at, booking.clone(), url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_time_attrs_with_title() {
        let html = r#"<html><body>
            <h1>Eraserhead</h1>
            <time datetime="2025-11-20T20:00:00">8pm</time>
            <time datetime="2025-11-21T20:00:00">8pm</time>
            <a href="/tickets/eraserhead">Buy tickets</a>
        </body></html>"#;
        let rows = extract(html, "https://v.test/eraserhead", "the-nickel");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.booking_url == "https://v.test/tickets/eraserhead"));
    }

    #[test]
    fn duplicate_instants_collapse() {
        let html = r#"<html><body><h1>X</h1>
            <time datetime="2025-11-20T20:00:00">8pm</time>
            <time datetime="2025-11-20T20:00:00">8pm</time>
        </body></html>"#;
        assert_eq!(extract(html, "https://v.test/x", "ica").len(), 1);
    }

    #[test]
    fn booking_defaults_to_page() {
        let html = r#"<html><body><h1>X</h1>
            <time datetime="2025-11-20T20:00:00">8pm</time>
        </body></html>"#;
        let rows = extract(html, "https://v.test/x", "ica");
        assert_eq!(rows[0].booking_url, "https://v.test/x");
    }
}
