use std::collections::HashSet;

use scraper::{Html, Selector};

use super::{booking_anchor, page_title, resolve_url, ScreeningRow};
use crate::formats::format_field;
use crate::timeparse::{london_to_utc, parse_date_text, parse_time_text};

const BLOCK_SELECTOR: &str =
    ".performance, .screening, .showtime, [class*='performance'], article, li";

/// Strategy 2: explicit performance-list markup. Repeating blocks each
/// render a date ("Tue, 19 Aug 2025") and a time ("04:10 pm") as text;
/// entries failing either pattern are skipped.
pub fn extract(html: &str, url: &str, venue: &str) -> Vec<ScreeningRow> {
    let doc = Html::parse_document(html);
    let Some(title) = page_title(&doc) else {
        return Vec::new();
    };
    let Ok(sel) = Selector::parse(BLOCK_SELECTOR) else {
        return Vec::new();
    };

    let page_booking = booking_anchor(&doc, url);
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for block in doc.select(&sel) {
        let text: String = block.text().collect::<Vec<_>>().join(" ");
        let (Some(date), Some(time)) = (parse_date_text(&text), parse_time_text(&text)) else {
            continue;
        };
        let Some(start_at) = london_to_utc(date.and_time(time)) else {
            continue;
        };

        // Prefer a booking link inside the block itself
        let block_booking = Selector::parse("a[href*='ticket'], a[href*='book'], a[href*='buy']")
            .ok()
            .and_then(|s| {
                block
                    .select(&s)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| resolve_url(href, url))
            });
        let booking = block_booking
            .or_else(|| page_booking.clone())
            .unwrap_or_else(|| url.to_string());

        let mut row = ScreeningRow::new(venue, &title, start_at, booking, url);
        row.format = format_field(&text);
        if seen.insert(row.id.clone()) {
            rows.push(row);
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeating_blocks_and_skips_malformed() {
        let html = r#"<html><body>
            <h1>Stalker</h1>
            <ul>
              <li class="performance">Tue, 19 Aug 2025 04:10 pm <a href="/book/1">Book</a></li>
              <li class="performance">Wed, 20 Aug 2025 06:30 pm <a href="/book/2">Book</a></li>
              <li class="performance">Members' preview — time TBC</li>
            </ul>
        </body></html>"#;
        let rows = extract(html, "https://v.test/stalker", "bfi-southbank");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].start_at.to_rfc3339(), "2025-08-19T15:10:00+00:00");
        assert_eq!(rows[0].booking_url, "https://v.test/book/1");
        assert_eq!(rows[1].booking_url, "https://v.test/book/2");
    }

    #[test]
    fn requires_page_heading() {
        let html = r#"<html><body>
            <div class="performance">Tue, 19 Aug 2025 04:10 pm</div>
        </body></html>"#;
        assert!(extract(html, "https://v.test/x", "ica").is_empty());
    }
}
