use std::sync::LazyLock;

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Europe::London;
use regex::Regex;

static OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Z|[+-]\d{2}:?\d{2})$").unwrap());
static DATE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(\d{4})")
        .unwrap()
});
static TIME_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})[:.](\d{2})\s*([ap]m)?").unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Canonical UTC instant from a date string. Strings carrying an explicit
/// offset or zone marker parse directly; naive strings are interpreted as
/// London civil time, honouring DST at that date.
pub fn to_utc(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if OFFSET_RE.is_match(s) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z", "%Y-%m-%d %H:%M:%S%z"] {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }
    }

    london_to_utc(parse_naive(s)?)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    // Date-only inputs map to local midnight
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

/// Interpret a naive wall-clock datetime as Europe/London and convert to UTC.
pub fn london_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match London.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        // Autumn clock change: the earlier reading is the screening time
        LocalResult::Ambiguous(earlier, _) => Some(earlier.with_timezone(&Utc)),
        // Spring-forward gap: shift into the valid hour
        LocalResult::None => match London.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            _ => None,
        },
    }
}

/// Parse rendered date text like "Tue, 19 Aug 2025".
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let caps = DATE_TEXT_RE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = MONTHS.iter().position(|m| caps[2].eq_ignore_ascii_case(m))? as u32 + 1;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse rendered time text like "04:10 pm", "4.10pm" or "16:10".
pub fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let caps = TIME_TEXT_RE.captures(text)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref ampm) if ampm == "pm" && hour < 12 => hour += 12,
        Some(ref ampm) if ampm == "am" && hour == 12 => hour = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
