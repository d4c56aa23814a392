//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use bd_core::{ScopeId, SubjectId, Task};
use bd_db::{Database, ScopeRecord};
use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z), a date (e.g., 2026-01-15) or relative (e.g., '3 days ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    let duration = Duration::minutes(n * minutes_per_unit);
    Ok(Utc::now() - duration)
}

/// Parse a sprint boundary.
///
/// Accepts everything [`parse_datetime`] does, plus a bare `YYYY-MM-DD` date in
/// local time. A bare date means the start of that day, or its last second
/// when `end_of_day` is set.
pub fn parse_sprint_bound(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") else {
        return parse_datetime(s);
    };

    if end_of_day {
        let next = date
            .succ_opt()
            .with_context(|| format!("date out of range: {s}"))?;
        let midnight = local_midnight_to_utc(next)
            .with_context(|| format!("no local midnight on {next}"))?;
        Ok(midnight - Duration::seconds(1))
    } else {
        local_midnight_to_utc(date).with_context(|| format!("no local midnight on {date}"))
    }
}

/// Converts a local date at midnight to UTC.
/// Handles DST ambiguity by picking the earlier time.
pub fn local_midnight_to_utc(local_date: NaiveDate) -> Option<DateTime<Utc>> {
    match Local.from_local_datetime(&local_date.and_time(NaiveTime::MIN)) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => {
            // DST spring-forward gap at midnight
            let one_am = local_date.and_hms_opt(1, 0, 0)?;
            Local
                .from_local_datetime(&one_am)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Looks up a scope, failing with a readable message if it is unknown.
pub fn require_scope(db: &Database, id: &str) -> Result<ScopeRecord> {
    let scope_id = ScopeId::new(id)?;
    db.get_scope(&scope_id)?
        .with_context(|| format!("unknown scope: {id}"))
}

/// Display name of a task: `monogram: title`.
pub fn task_display(task: &Task) -> String {
    format!("{}: {}", task.monogram, task.title)
}

/// Display names of tasks keyed by ID.
pub fn task_names(tasks: &[Task]) -> HashMap<&SubjectId, String> {
    tasks.iter().map(|t| (&t.id, task_display(t))).collect()
}

/// Width of `s` in characters, matching how `{:<width$}` pads.
pub fn display_width(s: &str) -> usize {
    s.chars().count()
}

/// Formats a point value without float noise: `5`, `6.5`, `0.33`.
pub fn format_points(points: f64) -> String {
    let rounded = (points * 100.0).round() / 100.0;
    // Avoid printing "-0".
    if rounded.abs() < 0.005 {
        return "0".to_string();
    }
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_datetime("2025-06-02T09:30:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn parses_relative_days() {
        let before = Utc::now() - Duration::days(3);
        let dt = parse_datetime("3 days ago").unwrap();
        let after = Utc::now() - Duration::days(3);
        assert!(dt >= before && dt <= after);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("next tuesday").is_err());
        assert!(parse_datetime("999999999 weeks ago").is_err());
    }

    #[test]
    fn bare_date_starts_at_local_midnight() {
        let dt = parse_sprint_bound("2025-06-02", false).unwrap();
        let local = dt.with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(local.hour(), 0);
    }

    #[test]
    fn bare_end_date_covers_the_whole_day() {
        let dt = parse_sprint_bound("2025-06-06", true).unwrap();
        let local = dt.with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 6, 6).unwrap());
        assert_eq!((local.hour(), local.minute(), local.second()), (23, 59, 59));
    }

    #[test]
    fn sprint_bound_falls_back_to_datetime() {
        let dt = parse_sprint_bound("2025-06-02T09:30:00Z", true).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn display_width_counts_characters() {
        assert_eq!(display_width("T1: Fix login"), 13);
        assert_eq!(display_width("T2: Überarbeitung"), 17);
        assert_eq!(display_width(""), 0);
    }

    #[test]
    fn format_points_trims_float_noise() {
        assert_eq!(format_points(5.0), "5");
        assert_eq!(format_points(0.1 + 0.2), "0.3");
        assert_eq!(format_points(6.7), "6.7");
        assert_eq!(format_points(-0.0), "0");
    }
}
