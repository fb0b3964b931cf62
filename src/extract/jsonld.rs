use std::collections::HashSet;

use scraper::{Html, Selector};
use serde_json::Value;

use super::{resolve_url, ScreeningRow};
use crate::timeparse::to_utc;

const MAX_DEPTH: usize = 3;

/// Strategy 1: script-embedded structured event metadata (schema.org
/// `Event` vocabulary). Accepts a bare object, an array, or a graph-wrapped
/// array, and descends into sub-events and schedule entries, since one
/// programme object may represent several performances.
pub fn extract(html: &str, url: &str, venue: &str) -> Vec<ScreeningRow> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for el in doc.select(&sel) {
        let raw: String = el.text().collect();
        let Some(value) = parse_lenient(&raw) else {
            continue;
        };
        for item in root_items(value) {
            collect_events(&item, url, venue, 0, &mut rows, &mut seen);
        }
    }

    rows
}

/// Some sites embed JSON with stray nulls or trailing commas; try the raw
/// text first, then a repaired copy.
fn parse_lenient(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    let repaired = trimmed
        .replace('\u{0000}', "")
        .replace(",]", "]")
        .replace(", ]", "]")
        .replace(",}", "}")
        .replace(", }", "}");
    serde_json::from_str(&repaired).ok()
}

fn root_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("@graph") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                obj.insert("@graph".to_string(), other);
                vec![Value::Object(obj)]
            }
            None => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    }
}

fn collect_events(
    item: &Value,
    page_url: &str,
    venue: &str,
    depth: usize,
    rows: &mut Vec<ScreeningRow>,
    seen: &mut HashSet<String>,
) {
    if depth > MAX_DEPTH || !item.is_object() {
        return;
    }

    if is_event(item) {
        if let (Some(name), Some(start)) = (event_name(item), event_start(item)) {
            if let Some(start_at) = to_utc(&start) {
                let booking = booking_url(item, page_url);
                let mut row = ScreeningRow::new(venue, &name, start_at, booking, page_url);
                row.director = director_of(item);
                if seen.insert(row.id.clone()) {
                    rows.push(row);
                }
            }
        }

        // Schedule entries carry their own start but inherit the programme
        // title and booking link.
        for entry in array_or_single(item.get("eventSchedule")) {
            let start = entry
                .get("startDate")
                .or_else(|| entry.get("startTime"))
                .and_then(Value::as_str);
            if let (Some(name), Some(start)) = (event_name(item), start) {
                if let Some(start_at) = to_utc(start) {
                    let booking = booking_url(item, page_url);
                    let row = ScreeningRow::new(venue, &name, start_at, booking, page_url);
                    if seen.insert(row.id.clone()) {
                        rows.push(row);
                    }
                }
            }
        }
    }

    for key in ["subEvent", "event", "events"] {
        for sub in array_or_single(item.get(key)) {
            collect_events(&sub, page_url, venue, depth + 1, rows, seen);
        }
    }
}

fn is_event(item: &Value) -> bool {
    let t = item.get("@type").or_else(|| item.get("type"));
    let types: Vec<String> = match t {
        Some(Value::String(s)) => vec![s.to_lowercase()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect(),
        _ => Vec::new(),
    };
    types.iter().any(|t| t == "event" || t.ends_with("event"))
}

fn event_name(item: &Value) -> Option<String> {
    item.get("name")
        .or_else(|| item.get("headline"))
        .or_else(|| item.get("workPresented").and_then(|w| w.get("name")))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn event_start(item: &Value) -> Option<String> {
    item.get("startDate")
        .or_else(|| item.get("startTime"))
        .or_else(|| item.get("start"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Offers sub-structure (single object or array) wins; then the item's own
/// url; the page URL is the last resort. Always absolutized.
fn booking_url(item: &Value, page_url: &str) -> String {
    let offers_url = match item.get("offers") {
        Some(Value::Array(arr)) => arr
            .iter()
            .find_map(|o| o.get("url").and_then(Value::as_str))
            .map(str::to_string),
        Some(Value::Object(obj)) => obj.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    let item_url = item.get("url").and_then(Value::as_str).map(str::to_string);

    offers_url
        .or(item_url)
        .and_then(|href| resolve_url(&href, page_url))
        .unwrap_or_else(|| page_url.to_string())
}

fn director_of(item: &Value) -> Option<String> {
    let director = item.get("workPresented")?.get("director")?;
    let node = match director {
        Value::Array(arr) => arr.first()?,
        other => other,
    };
    match node {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

fn array_or_single(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(arr)) => arr.clone(),
        Some(obj @ Value::Object(_)) => vec![obj.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(json: &str) -> String {
        format!(
            "<html><body><script type=\"application/ld+json\">{json}</script></body></html>"
        )
    }

    #[test]
    fn bare_event_object() {
        let html = wrap(
            r#"{"@type":"Event","name":"Playtime","startDate":"2025-01-10T18:00:00",
               "offers":{"url":"/book/playtime"}}"#,
        );
        let rows = extract(&html, "https://x.test/events/playtime", "ica");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Playtime");
        assert_eq!(rows[0].booking_url, "https://x.test/book/playtime");
        assert_eq!(rows[0].start_at.to_rfc3339(), "2025-01-10T18:00:00+00:00");
    }

    #[test]
    fn graph_wrap_and_offers_array() {
        let html = wrap(
            r#"{"@graph":[
                {"@type":"ScreeningEvent","name":"Stalker","startDate":"2025-08-19T20:30:00",
                 "offers":[{"price":"12"},{"url":"https://t.test/stalker"}]},
                {"@type":"Organization","name":"Some Cinema"}
            ]}"#,
        );
        let rows = extract(&html, "https://x.test/p", "bfi-southbank");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].booking_url, "https://t.test/stalker");
    }

    #[test]
    fn sub_events_expand() {
        let html = wrap(
            r#"{"@type":"Event","name":"Tarkovsky Season","startDate":"2025-08-19T12:00:00",
                "subEvent":[
                  {"@type":"Event","name":"Mirror","startDate":"2025-08-19T14:00:00"},
                  {"@type":"Event","name":"Solaris","startDate":"2025-08-19T18:00:00"}
                ]}"#,
        );
        let rows = extract(&html, "https://x.test/season", "ica");
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert!(titles.contains(&"Tarkovsky Season"));
        assert!(titles.contains(&"Mirror"));
        assert!(titles.contains(&"Solaris"));
    }

    #[test]
    fn schedule_entries_inherit_title() {
        let html = wrap(
            r#"{"@type":"Event","name":"Weekly Matinee","url":"/matinee",
                "eventSchedule":[
                  {"startDate":"2025-08-20T14:00:00"},
                  {"startDate":"2025-08-27T14:00:00"}
                ]}"#,
        );
        let rows = extract(&html, "https://x.test/m", "ica");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.title == "Weekly Matinee"));
        assert!(rows.iter().all(|r| r.booking_url == "https://x.test/matinee"));
    }

    #[test]
    fn booking_falls_back_to_page_url() {
        let html = wrap(r#"{"@type":"Event","name":"X","startDate":"2025-08-19T18:00:00"}"#);
        let rows = extract(&html, "https://x.test/p", "ica");
        assert_eq!(rows[0].booking_url, "https://x.test/p");
    }

    #[test]
    fn missing_name_or_start_is_skipped() {
        let html = wrap(r#"[{"@type":"Event","name":"No Start"},{"@type":"Event","startDate":"2025-08-19T18:00:00"}]"#);
        assert!(extract(&html, "https://x.test/p", "ica").is_empty());
    }

    #[test]
    fn director_from_work_presented() {
        let html = wrap(
            r#"{"@type":"ScreeningEvent","name":"Mirror","startDate":"2025-08-19T18:00:00",
                "workPresented":{"name":"Mirror","director":{"name":"Andrei Tarkovsky"}}}"#,
        );
        let rows = extract(&html, "https://x.test/p", "ica");
        assert_eq!(rows[0].director.as_deref(), Some("Andrei Tarkovsky"));
    }

    #[test]
    fn repaired_json_with_trailing_comma() {
        let html = wrap(r#"{"@type":"Event","name":"Y","startDate":"2025-08-19T18:00:00",}"#);
        assert_eq!(extract(&html, "https://x.test/p", "ica").len(), 1);
    }
}
