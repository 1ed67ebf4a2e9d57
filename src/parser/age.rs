use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::debug;

use crate::record::DaysRunning;

static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(?:hrs?|hours?)\s+ago").unwrap());
static DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*d(?:ays?)?\s+ago").unwrap());
static ABSOLUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").unwrap()
});

/// Days since a campaign was created, judged against `today`.
///
/// Rules are tried in a fixed order and the first match wins, so "3 hrs ago"
/// beats an absolute date sitting in the same text:
/// 1. `N hrs ago` → 0
/// 2. `N d ago` / `N days ago` → N
/// 3. `Month Day, Year` → days between that date and `today`
/// 4. `published` (ISO-8601 metadata) → same day difference
///
/// Future dates are `Unknown`, never negative.
pub fn normalize_age(text: &str, published: Option<&str>, today: NaiveDate) -> DaysRunning {
    if HOURS_RE.is_match(text) {
        return DaysRunning::Days(0);
    }

    if let Some(caps) = DAYS_RE.captures(text) {
        match caps[1].parse::<u32>() {
            Ok(n) => return DaysRunning::Days(n),
            Err(e) => debug!("Unparsable day count {:?}: {}", &caps[1], e),
        }
    }

    if let Some(date) = find_absolute_date(text) {
        return days_between(date, today);
    }

    if let Some(ts) = published.map(str::trim).filter(|s| !s.is_empty()) {
        match parse_timestamp(ts) {
            Some(date) => return days_between(date, today),
            None => debug!("Unparsable publication timestamp {:?}", ts),
        }
    }

    DaysRunning::Unknown
}

fn days_between(created: NaiveDate, today: NaiveDate) -> DaysRunning {
    let diff = (today - created).num_days();
    match u32::try_from(diff) {
        Ok(n) => DaysRunning::Days(n),
        Err(_) => {
            debug!("Creation date {} is after reference date {}", created, today);
            DaysRunning::Unknown
        }
    }
}

/// First `Month Day, Year` in `text` whose month name is real.
fn find_absolute_date(text: &str) -> Option<NaiveDate> {
    ABSOLUTE_RE.captures_iter(text).find_map(|caps| {
        let candidate = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
        let parsed = NaiveDate::parse_from_str(&candidate, "%B %d %Y")
            .or_else(|_| NaiveDate::parse_from_str(&candidate, "%b %d %Y"));
        if parsed.is_err() && is_month_name(&caps[1]) {
            debug!("Malformed absolute date {:?}", candidate);
        }
        parsed.ok()
    })
}

fn is_month_name(word: &str) -> bool {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = word.to_lowercase();
    MONTHS.iter().any(|m| lower.starts_with(m))
}

fn parse_timestamp(ts: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(ts.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 26).unwrap()
    }

    #[test]
    fn hours_ago_is_zero() {
        assert_eq!(normalize_age("Created 5 hrs ago", None, today()), DaysRunning::Days(0));
        assert_eq!(normalize_age("1 hr ago", None, today()), DaysRunning::Days(0));
    }

    #[test]
    fn days_ago_taken_as_written() {
        assert_eq!(normalize_age("Created 12 d ago", None, today()), DaysRunning::Days(12));
        assert_eq!(normalize_age("3 days ago", None, today()), DaysRunning::Days(3));
        assert_eq!(normalize_age("1 day ago", None, today()), DaysRunning::Days(1));
    }

    #[test]
    fn absolute_date_against_reference() {
        assert_eq!(
            normalize_age("Created October 16, 2025", None, today()),
            DaysRunning::Days(10)
        );
        assert_eq!(
            normalize_age("Created Sep 1st 2025", None, today()),
            DaysRunning::Days(55)
        );
    }

    #[test]
    fn future_date_is_unknown() {
        assert_eq!(
            normalize_age("Created December 1, 2025", None, today()),
            DaysRunning::Unknown
        );
    }

    #[test]
    fn hours_rule_beats_absolute_date() {
        let text = "Created October 1, 2025 · updated 3 hrs ago";
        assert_eq!(normalize_age(text, None, today()), DaysRunning::Days(0));
    }

    #[test]
    fn text_rules_beat_metadata() {
        let meta = Some("2025-01-01T00:00:00Z");
        assert_eq!(normalize_age("4 d ago", meta, today()), DaysRunning::Days(4));
    }

    #[test]
    fn metadata_timestamp_fallback() {
        assert_eq!(
            normalize_age("", Some("2025-10-20T08:15:00+00:00"), today()),
            DaysRunning::Days(6)
        );
        assert_eq!(normalize_age("", Some("2025-10-25"), today()), DaysRunning::Days(1));
    }

    #[test]
    fn nothing_matches_is_unknown() {
        assert_eq!(normalize_age("Donate now", None, today()), DaysRunning::Unknown);
        assert_eq!(normalize_age("", Some("not a date"), today()), DaysRunning::Unknown);
        assert_eq!(normalize_age("Foo 31, 2025", None, today()), DaysRunning::Unknown);
    }
}
