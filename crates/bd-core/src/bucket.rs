//! Calendar-day buckets spanning a sprint window.
//!
//! A burndown series has one bucket per calendar day of the sprint, in the
//! viewer's time zone, plus a leading "before" bucket that collects everything
//! that happened before the sprint started and a trailing "after" bucket for
//! everything after it ended:
//!
//! ```text
//! [before] [Mon Jun 2] [Tue Jun 3] ... [Fri Jun 13] [after]
//! ```
//!
//! Buckets are addressed by index. Labels are for display only.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::BurndownError;

/// Label of the leading overflow bucket.
pub const BEFORE_LABEL: &str = "Start of Sprint";

/// Label of the trailing overflow bucket.
pub const AFTER_LABEL: &str = "After end of Sprint";

/// Longest sprint, in days, that can be bucketed.
pub const MAX_SPRINT_DAYS: i64 = 366;

const SECONDS_PER_DAY: i64 = 86_400;

/// Inclusive start and end of a sprint, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintWindow {
    pub start: i64,
    pub end: i64,
}

impl SprintWindow {
    /// Creates a window, rejecting one that ends before it starts or spans
    /// more than [`MAX_SPRINT_DAYS`].
    pub fn new(start: i64, end: i64) -> Result<Self, BurndownError> {
        let too_long = end
            .checked_sub(start)
            .is_none_or(|length| length > MAX_SPRINT_DAYS * SECONDS_PER_DAY);
        if end < start || too_long {
            return Err(BurndownError::InvalidSprintWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Start of the window as a UTC datetime.
    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start, 0)
    }

    /// End of the window as a UTC datetime.
    pub fn end_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.end, 0)
    }
}

/// Position of a bucket in the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "date", rename_all = "snake_case")]
pub enum BucketKind {
    /// Everything before the sprint started.
    Before,
    /// One calendar day of the sprint.
    Day(NaiveDate),
    /// Everything after the sprint ended.
    After,
}

impl BucketKind {
    /// The calendar date of a day bucket.
    pub const fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Day(date) => Some(*date),
            Self::Before | Self::After => None,
        }
    }

    /// Whether this is a sprint day falling on Monday through Friday.
    pub fn is_business_day(&self) -> bool {
        self.date()
            .is_some_and(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
    }
}

/// One slot of a burndown series.
///
/// The `*_today` fields are deltas filled in while events are applied. The
/// running totals and the ideal curve are only valid once the cumulative and
/// baseline passes have run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub label: String,
    pub kind: BucketKind,

    pub added_tasks_today: i64,
    pub closed_tasks_today: i64,
    pub added_points_today: f64,
    pub closed_points_today: f64,

    pub total_tasks: i64,
    pub remaining_tasks: i64,
    pub total_points: f64,
    pub remaining_points: f64,
    pub ideal_remaining_points: f64,
}

impl DateBucket {
    /// Creates an empty bucket.
    pub fn new(kind: BucketKind) -> Self {
        let label = match kind {
            BucketKind::Before => BEFORE_LABEL.to_string(),
            BucketKind::Day(date) => date.format("%a %b %-d").to_string(),
            BucketKind::After => AFTER_LABEL.to_string(),
        };
        Self {
            label,
            kind,
            added_tasks_today: 0,
            closed_tasks_today: 0,
            added_points_today: 0.0,
            closed_points_today: 0.0,
            total_tasks: 0,
            remaining_tasks: 0,
            total_points: 0.0,
            remaining_points: 0.0,
            ideal_remaining_points: 0.0,
        }
    }
}

/// Builds the bucket sequence for a sprint window and maps timestamps onto it.
#[derive(Debug, Clone)]
pub struct DateBucketizer<Tz: TimeZone> {
    window: SprintWindow,
    first_day: NaiveDate,
    last_day: NaiveDate,
    tz: Tz,
}

impl<Tz: TimeZone> DateBucketizer<Tz> {
    /// Creates a bucketizer for `window`, using `tz` to find calendar days.
    pub fn new(window: SprintWindow, tz: Tz) -> Result<Self, BurndownError> {
        let invalid = || BurndownError::InvalidSprintWindow {
            start: window.start,
            end: window.end,
        };
        let start = window.start_utc().ok_or_else(invalid)?;
        let end = window.end_utc().ok_or_else(invalid)?;

        let first_day = start.with_timezone(&tz).date_naive();
        let last_day = end.with_timezone(&tz).date_naive();
        // A window of MAX_SPRINT_DAYS can touch one extra calendar day.
        let span = (last_day - first_day).num_days();
        if !(0..=MAX_SPRINT_DAYS).contains(&span) {
            return Err(invalid());
        }

        Ok(Self {
            window,
            first_day,
            last_day,
            tz,
        })
    }

    /// The window this bucketizer covers.
    pub const fn window(&self) -> SprintWindow {
        self.window
    }

    /// Number of calendar days in the sprint.
    pub fn day_count(&self) -> usize {
        usize::try_from((self.last_day - self.first_day).num_days() + 1).unwrap_or(0)
    }

    /// Total number of buckets, overflow buckets included.
    pub fn len(&self) -> usize {
        self.day_count() + 2
    }

    /// Always false: a series has at least its two overflow buckets.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Index of the trailing overflow bucket.
    pub fn after_index(&self) -> usize {
        self.day_count() + 1
    }

    /// Builds the empty bucket sequence: before, each sprint day, after.
    pub fn build(&self) -> Vec<DateBucket> {
        let mut buckets = Vec::with_capacity(self.len());
        buckets.push(DateBucket::new(BucketKind::Before));
        buckets.extend(
            self.first_day
                .iter_days()
                .take_while(|day| *day <= self.last_day)
                .map(|day| DateBucket::new(BucketKind::Day(day))),
        );
        buckets.push(DateBucket::new(BucketKind::After));
        buckets
    }

    /// Index of the bucket a timestamp belongs to.
    pub fn locate(&self, timestamp: i64) -> usize {
        if timestamp < self.window.start {
            return 0;
        }
        if timestamp > self.window.end {
            return self.after_index();
        }

        let Some(at) = DateTime::from_timestamp(timestamp, 0) else {
            return self.after_index();
        };
        let day = at.with_timezone(&self.tz).date_naive();
        let offset = (day - self.first_day).num_days();
        let index = usize::try_from(offset).map_or(1, |offset| offset + 1);
        index.clamp(1, self.day_count())
    }
}
