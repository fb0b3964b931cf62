use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

// Gauge patterns consume the adjacent character so "135mm" cannot match the
// 35mm gauge.
static MM35_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])35\s?mm(?:[^0-9]|$)").unwrap());
static MM70_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])70\s?mm(?:[^0-9]|$)").unwrap());
static MM16_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])16\s?mm(?:[^0-9]|$)").unwrap());
static QA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bq\s*(?:&|\+|and)?\s*a\b").unwrap());
static SUBS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(subtitled|subtitles|captioned|captions|hoh)\b").unwrap());
static FOURK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b4k\b").unwrap());
static IMAX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bimax\b").unwrap());

/// Classify free text against the fixed presentation-tag vocabulary.
pub fn detect_formats(text: &str) -> BTreeSet<String> {
    let t = text.to_lowercase();
    let mut out = BTreeSet::new();

    if MM35_RE.is_match(&t) {
        out.insert("35 mm".to_string());
    }
    if MM70_RE.is_match(&t) {
        out.insert("70 mm".to_string());
    }
    if MM16_RE.is_match(&t) {
        out.insert("16 mm".to_string());
    }
    if QA_RE.is_match(&t) {
        out.insert("Q and A".to_string());
    }
    if SUBS_RE.is_match(&t) {
        out.insert("Subtitled".to_string());
    }
    if FOURK_RE.is_match(&t) {
        out.insert("4K".to_string());
    }
    if IMAX_RE.is_match(&t) {
        out.insert("IMAX".to_string());
    }

    out
}

/// Joined rendering for the row field, or None when nothing matched.
pub fn format_field(text: &str) -> Option<String> {
    let tags = detect_formats(text);
    if tags.is_empty() {
        None
    } else {
        Some(tags.into_iter().collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<String> {
        detect_formats(text).into_iter().collect()
    }

    #[test]
    fn gauge_and_qa() {
        assert_eq!(tags("Presented on 35mm with a Q&A"), vec!["35 mm", "Q and A"]);
    }

    #[test]
    fn digit_adjacency_guard() {
        assert!(tags("shot on a 135mm lens").is_empty());
        assert_eq!(tags("a 70 mm print"), vec!["70 mm"]);
    }

    #[test]
    fn qa_spellings() {
        for s in ["Q&A", "Q and A", "Q + A", "q&a with the director"] {
            assert_eq!(tags(s), vec!["Q and A"], "failed on {s:?}");
        }
    }

    #[test]
    fn remaining_vocabulary() {
        assert_eq!(tags("4K restoration, subtitled"), vec!["4K", "Subtitled"]);
        assert_eq!(tags("IMAX 70mm"), vec!["70 mm", "IMAX"]);
        assert!(tags("a regular screening").is_empty());
    }

    #[test]
    fn field_rendering() {
        assert_eq!(format_field("16mm, captioned"), Some("16 mm, Subtitled".into()));
        assert_eq!(format_field("nothing special"), None);
    }
}
