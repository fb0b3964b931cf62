use chrono::{DateTime, Utc};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const MAX_SLUG_LEN: usize = 120;

/// Unicode-normalize, strip diacritics, lowercase, and collapse every run of
/// non-alphanumeric characters into a single hyphen.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            pending_hyphen = true;
        }
    }

    out.chars().take(MAX_SLUG_LEN).collect()
}

/// Deterministic row id: `venue-YYYYMMDDHHMM-title`. Minute granularity is
/// deliberate so extraction strategies disagreeing on seconds still collapse
/// to one id.
pub fn make_id(venue: &str, start_at: &DateTime<Utc>, title: &str) -> String {
    let time_key = start_at.format("%Y%m%d%H%M");
    format!("{}-{}-{}", slugify(venue), time_key, slugify(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_strips_diacritics_and_collapses() {
        assert_eq!(slugify("Amélie"), "amelie");
        assert_eq!(slugify("Jeanne Dielman, 23 quai du Commerce"), "jeanne-dielman-23-quai-du-commerce");
        assert_eq!(slugify("  --Weird__ Title!!  "), "weird-title");
    }

    #[test]
    fn slugify_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(slugify(&long).len(), 120);
    }

    #[test]
    fn id_truncates_to_minute() {
        let a = Utc.with_ymd_and_hms(2025, 8, 19, 15, 10, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 8, 19, 15, 10, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2025, 8, 19, 15, 11, 0).unwrap();
        assert_eq!(make_id("ica", &a, "La Chimera"), make_id("ica", &b, "La Chimera"));
        assert_ne!(make_id("ica", &a, "La Chimera"), make_id("ica", &c, "La Chimera"));
        assert_eq!(make_id("ica", &a, "La Chimera"), "ica-202508191510-la-chimera");
    }
}
