//! Ideal remaining-points baseline.
//!
//! The ideal line burns the starting backlog down linearly over the sprint's
//! business days. Weekends hold the line flat. Holidays are not modelled.

use crate::bucket::{BucketKind, DateBucket};

/// Fills `ideal_remaining_points` on every bucket.
///
/// Must run after the running totals have been filled in: the starting backlog
/// is the "before" bucket's `total_points`.
pub fn apply_ideal_baseline(buckets: &mut [DateBucket]) {
    let total_business_days = buckets.iter().filter(|b| b.kind.is_business_day()).count();
    let start_total = buckets
        .iter()
        .find(|b| b.kind == BucketKind::Before)
        .map_or(0.0, |b| b.total_points);

    let mut elapsed_business_days = 0usize;
    for bucket in buckets {
        bucket.ideal_remaining_points = match bucket.kind {
            BucketKind::Before => bucket.total_points,
            BucketKind::After => 0.0,
            BucketKind::Day(_) => {
                if bucket.kind.is_business_day() {
                    elapsed_business_days += 1;
                }
                ideal_remaining(start_total, elapsed_business_days, total_business_days)
            }
        };
    }
}

/// Points the ideal line leaves after `elapsed` of `total` business days.
///
/// A sprint with no business days has nothing to burn down over, so the
/// ideal is zero throughout.
#[expect(
    clippy::cast_precision_loss,
    reason = "business day counts are far below f64 precision limits"
)]
fn ideal_remaining(start_total: f64, elapsed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let fraction_left = 1.0 - (elapsed as f64 / total as f64);
    round_to_tenth(start_total * fraction_left)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "ideal values are rounded to one decimal"
)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Buckets for consecutive days starting at `first`, with `start_total`
    /// points already in the before bucket.
    fn series(first: NaiveDate, days: u64, start_total: f64) -> Vec<DateBucket> {
        let mut buckets = vec![DateBucket::new(BucketKind::Before)];
        buckets.extend(
            first
                .iter_days()
                .take(usize::try_from(days).unwrap())
                .map(|d| DateBucket::new(BucketKind::Day(d))),
        );
        buckets.push(DateBucket::new(BucketKind::After));
        for bucket in &mut buckets {
            bucket.total_points = start_total;
        }
        buckets
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn ideals(buckets: &[DateBucket]) -> Vec<f64> {
        buckets.iter().map(|b| b.ideal_remaining_points).collect()
    }

    #[test]
    fn linear_over_business_week() {
        let mut buckets = series(monday(), 5, 10.0);
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![10.0, 8.0, 6.0, 4.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn weekends_hold_the_line() {
        // Thu, Fri, Sat, Sun, Mon
        let thursday = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        let mut buckets = series(thursday, 5, 9.0);
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![9.0, 6.0, 3.0, 3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn rounds_to_one_decimal() {
        let mut buckets = series(monday(), 3, 10.0);
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![10.0, 6.7, 3.3, 0.0, 0.0]);
    }

    #[test]
    fn single_business_day_sprint_is_zero() {
        let mut buckets = series(monday(), 1, 5.0);
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![5.0, 0.0, 0.0]);
    }

    #[test]
    fn weekend_only_sprint_is_zero_without_dividing() {
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let mut buckets = series(saturday, 2, 5.0);
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn uses_starting_backlog_not_daily_total() {
        let mut buckets = series(monday(), 2, 4.0);
        // Scope grew on day 2.
        buckets[2].total_points = 10.0;
        buckets[3].total_points = 10.0;
        apply_ideal_baseline(&mut buckets);

        assert_eq!(ideals(&buckets), vec![4.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn ideal_is_non_increasing_across_days() {
        let mut buckets = series(monday(), 17, 23.0);
        apply_ideal_baseline(&mut buckets);

        let days = &buckets[1..buckets.len() - 1];
        assert!(days.windows(2).all(|w| w[1].ideal_remaining_points <= w[0].ideal_remaining_points));
        assert_eq!(buckets[0].ideal_remaining_points, 23.0);
        assert_eq!(buckets[buckets.len() - 1].ideal_remaining_points, 0.0);
    }
}
