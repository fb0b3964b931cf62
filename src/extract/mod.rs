pub mod jsonld;
pub mod performance;
pub mod script;
pub mod timetag;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::formats::format_field;
use crate::ident::make_id;

/// One extracted screening occurrence, prior to persistence. The id is a
/// same-run dedup key only; the durable identity lives in storage as the
/// natural key (cinema, film, start time).
#[derive(Debug, Clone)]
pub struct ScreeningRow {
    pub id: String,
    pub title: String,
    pub director: Option<String>,
    pub year: Option<i32>,
    pub venue_id: String,
    pub start_at: DateTime<Utc>,
    pub format: Option<String>,
    pub booking_url: String,
    pub source_url: String,
    pub notes: Option<String>,
}

impl ScreeningRow {
    pub fn new(venue: &str, title: &str, start_at: DateTime<Utc>, booking: String, source: &str) -> Self {
        Self {
            id: make_id(venue, &start_at, title),
            title: title.to_string(),
            director: None,
            year: None,
            venue_id: venue.to_string(),
            start_at,
            format: None,
            booking_url: booking,
            source_url: source.to_string(),
            notes: None,
        }
    }
}

type Strategy = fn(&str, &str, &str) -> Vec<ScreeningRow>;

// Ranked chain: a higher-priority strategy that yields anything wins
// outright for the page.
const STRATEGIES: [Strategy; 4] = [
    jsonld::extract,
    performance::extract,
    script::extract,
    timetag::extract,
];

/// Turn one fetched page into candidate rows. Zero rows means the page had
/// no recognizable screening data, which is not an error.
pub fn extract_rows(html: &str, url: &str, venue: &str) -> Vec<ScreeningRow> {
    for strategy in STRATEGIES {
        let rows = strategy(html, url, venue);
        if !rows.is_empty() {
            return attach_formats(rows, html);
        }
    }
    Vec::new()
}

/// Fill in page-level detected formats on rows that lack one.
fn attach_formats(mut rows: Vec<ScreeningRow>, html: &str) -> Vec<ScreeningRow> {
    let page_format = format_field(&page_text(html));
    if let Some(fmt) = page_format {
        for row in &mut rows {
            if row.format.is_none() {
                row.format = Some(fmt.clone());
            }
        }
    }
    rows
}

pub(crate) fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Page-level title: first h1, falling back to itemprop=name.
pub(crate) fn page_title(doc: &Html) -> Option<String> {
    let h1 = Selector::parse("h1").ok()?;
    let itemprop = Selector::parse("[itemprop='name']").ok()?;
    for sel in [h1, itemprop] {
        if let Some(el) = doc.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// First ticket/book/buy anchor on the page, resolved against the page URL.
pub(crate) fn booking_anchor(doc: &Html, base: &str) -> Option<String> {
    let sel = Selector::parse("a[href*='ticket'], a[href*='book'], a[href*='buy']").ok()?;
    doc.select(&sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(href, base))
}

pub(crate) fn resolve_url(href: &str, base: &str) -> Option<String> {
    if href.trim().is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(abs) => Some(abs.to_string()),
        Err(_) => Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}

// ── Tests ──
