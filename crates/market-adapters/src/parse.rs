//! Lenient numeric/date parsing for provider payloads. Providers send
//! `"None"`, `"-"`, empty strings, comma-grouped numbers, `$`-prefixed
//! targets and `%`-suffixed ratios; all of that normalizes here.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse an optional numeric string. Sentinels and garbage become `None`.
pub fn parse_optional_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed {
        "None" | "none" | "-" | "N/A" | "n/a" | "null" => return None,
        _ => {}
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Same, through an `Option` layer.
pub fn parse_field(raw: &Option<String>) -> Option<f64> {
    raw.as_deref().and_then(parse_optional_f64)
}

/// Integer variant for counts (employees, analyst votes).
pub fn parse_field_i64(raw: &Option<String>) -> Option<i64> {
    parse_field(raw).map(|v| v as i64)
}

/// `YYYY-MM-DD`, always treated as a UTC calendar date. Timestamped keys
/// (`YYYY-MM-DD HH:MM` from intraday intervals) lose their time part.
pub fn parse_utc_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Midnight UTC for a calendar-date key.
pub fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_become_none() {
        for raw in ["None", "none", "", "  ", "-", "N/A", "null"] {
            assert_eq!(parse_optional_f64(raw), None, "raw={:?}", raw);
        }
    }

    #[test]
    fn strips_grouping_and_symbols() {
        assert_eq!(parse_optional_f64("1,234,567.89"), Some(1_234_567.89));
        assert_eq!(parse_optional_f64("$4.70"), Some(4.70));
        assert_eq!(parse_optional_f64("3.66%"), Some(3.66));
        assert_eq!(parse_optional_f64(" 22.96 "), Some(22.96));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_optional_f64("abc"), None);
        assert_eq!(parse_optional_f64("12.3.4"), None);
    }

    #[test]
    fn parses_dates_with_and_without_time() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_utc_date("2024-03-01"), Some(date));
        assert_eq!(parse_utc_date("2024-03-01 16:00"), Some(date));
        assert_eq!(parse_utc_date("not a date"), None);
    }
}
