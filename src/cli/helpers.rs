//! Shared helper functions for CLI commands

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::io::{self, BufRead, IsTerminal};

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Read crop IDs from stdin if it is piped
///
/// Returns `None` when stdin is a terminal, so commands can fall back to
/// their positional arguments:
/// ```bash
/// growline crop list --stage blackout --format id | growline batch advance
/// ```
pub fn read_ids_from_stdin() -> Option<Vec<String>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return None;
    }

    let ids: Vec<String> = stdin
        .lock()
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Parse crop IDs, accepting an optional `#` prefix
pub fn parse_crop_ids(raw: &[String]) -> Result<Vec<i64>, String> {
    raw.iter()
        .map(|s| {
            let trimmed = s.trim().trim_start_matches('#');
            trimmed
                .parse::<i64>()
                .map_err(|_| format!("Invalid crop id: '{}'", s))
        })
        .collect()
}

/// Parse a user-supplied instant
///
/// Accepts `now`, RFC 3339, `YYYY-MM-DD HH:MM[:SS]` and `YYYY-MM-DD`
/// (midnight). Times without an offset are taken as UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!(
        "Invalid time '{}' (expected 'now', RFC 3339, 'YYYY-MM-DD HH:MM' or 'YYYY-MM-DD')",
        s
    ))
}

/// Format an instant for tables
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// Human-readable signed duration, e.g. "2d 4h", "-35m"
pub fn format_minutes(minutes: i64) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.unsigned_abs();
    let (days, hours, mins) = (abs / 1440, (abs % 1440) / 60, abs % 60);
    if days > 0 {
        format!("{}{}d {}h", sign, days, hours)
    } else if hours > 0 {
        format!("{}{}h {}m", sign, hours, mins)
    } else {
        format!("{}{}m", sign, mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
    }

    #[test]
    fn test_parse_crop_ids() {
        let raw = vec!["12".to_string(), " #7 ".to_string()];
        assert_eq!(parse_crop_ids(&raw).unwrap(), vec![12, 7]);
        assert!(parse_crop_ids(&["tray".to_string()]).is_err());
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_instant("2024-05-01T09:30:00Z").unwrap(), expected);
        assert_eq!(parse_instant("2024-05-01T11:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_instant("2024-05-01 09:30").unwrap(), expected);
        assert_eq!(
            parse_instant("2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(125), "2h 5m");
        assert_eq!(format_minutes(3000), "2d 2h");
        assert_eq!(format_minutes(-1500), "-1d 1h");
    }
}
