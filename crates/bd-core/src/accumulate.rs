//! Accumulation of events into per-day deltas and running totals.
//!
//! # Algorithm Summary
//!
//! 1. Walk events in order, keeping a [`TaskState`] per task, and add each
//!    event's effect to the `*_today` fields of the bucket it falls in.
//! 2. Walk buckets in order, carrying the previous bucket's totals forward.
//!
//! Points follow the task: adding a task to the scope adds its current points,
//! closing it completes its current points, and a points change on a task that
//! is in scope adjusts the totals (and the completed points, if the task is
//! closed) by the difference.

use std::collections::HashMap;

use chrono::TimeZone;

use crate::bucket::{DateBucket, DateBucketizer};
use crate::event::{Event, EventKind};
use crate::types::SubjectId;

/// Running state of one task while events are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskState {
    /// Points the task is worth right now.
    pub current_points: f64,
    /// Whether the task is currently closed.
    pub is_closed: bool,
    /// Whether the task is currently a member of the scope.
    pub in_scope: bool,
}

/// Applies events to a bucket sequence.
#[derive(Debug)]
pub struct SeriesAccumulator<'a, Tz: TimeZone> {
    bucketizer: &'a DateBucketizer<Tz>,
    states: HashMap<SubjectId, TaskState>,
}

impl<'a, Tz: TimeZone> SeriesAccumulator<'a, Tz> {
    /// Creates an accumulator that locates events with `bucketizer`.
    pub fn new(bucketizer: &'a DateBucketizer<Tz>) -> Self {
        Self {
            bucketizer,
            states: HashMap::new(),
        }
    }

    /// Starts every given task at zero points, open and out of scope.
    #[must_use]
    pub fn with_subjects<I>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = SubjectId>,
    {
        for subject in subjects {
            self.states.entry(subject).or_default();
        }
        self
    }

    /// State of a task after the last [`Self::accumulate`] call.
    pub fn task_state(&self, subject: &SubjectId) -> Option<&TaskState> {
        self.states.get(subject)
    }

    /// All task states, keyed by task.
    pub const fn task_states(&self) -> &HashMap<SubjectId, TaskState> {
        &self.states
    }

    /// Applies `events` to `buckets` and fills in the running totals.
    ///
    /// `buckets` must come from the same bucketizer. Events must be sorted by
    /// timestamp.
    pub fn accumulate(&mut self, events: &[Event], mut buckets: Vec<DateBucket>) -> Vec<DateBucket> {
        for event in events {
            let index = self.bucketizer.locate(event.timestamp);
            let Some(bucket) = buckets.get_mut(index) else {
                tracing::warn!(
                    index,
                    buckets = buckets.len(),
                    "event located outside the bucket sequence"
                );
                continue;
            };
            let state = self.states.entry(event.subject_id.clone()).or_default();
            apply_event(bucket, state, event.kind);
        }

        fill_running_totals(&mut buckets);

        tracing::debug!(
            events = events.len(),
            tasks = self.states.len(),
            buckets = buckets.len(),
            "accumulated burndown series"
        );
        buckets
    }
}

/// Adds the effect of one event to a bucket and updates the task's state.
fn apply_event(bucket: &mut DateBucket, state: &mut TaskState, kind: EventKind) {
    match kind {
        EventKind::Create => {}
        EventKind::ScopeAdd => {
            bucket.added_tasks_today += 1;
            bucket.added_points_today += state.current_points;
            state.in_scope = true;
        }
        EventKind::ScopeRemove => {
            bucket.added_tasks_today -= 1;
            bucket.added_points_today -= state.current_points;
            state.in_scope = false;
        }
        EventKind::Close => {
            bucket.closed_tasks_today += 1;
            bucket.closed_points_today += state.current_points;
            state.is_closed = true;
        }
        EventKind::Reopen => {
            bucket.closed_tasks_today -= 1;
            bucket.closed_points_today -= state.current_points;
            state.is_closed = false;
        }
        EventKind::PointsChange { old, new } => {
            let delta = new - old;
            state.current_points = new;
            // Out-of-scope tasks only carry their points until they are added.
            if state.in_scope {
                bucket.added_points_today += delta;
                if state.is_closed {
                    bucket.closed_points_today += delta;
                }
            }
        }
    }
}

/// Computes totals and remaining counts from the per-day deltas.
pub fn fill_running_totals(buckets: &mut [DateBucket]) {
    let mut total_tasks = 0;
    let mut remaining_tasks = 0;
    let mut total_points = 0.0;
    let mut remaining_points = 0.0;

    for bucket in buckets {
        total_tasks += bucket.added_tasks_today;
        total_points += bucket.added_points_today;
        remaining_tasks += bucket.added_tasks_today - bucket.closed_tasks_today;
        remaining_points += bucket.added_points_today - bucket.closed_points_today;

        bucket.total_tasks = total_tasks;
        bucket.total_points = total_points;
        bucket.remaining_tasks = remaining_tasks;
        bucket.remaining_points = remaining_points;
    }
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "point values in these fixtures are small integers"
)]
mod tests {
    use super::*;
    use crate::bucket::SprintWindow;
    use crate::types::RecordId;
    use chrono::Utc;

    const DAY: i64 = 86_400;
    /// Monday June 2 2025, 00:00 UTC.
    const MONDAY: i64 = 1_748_822_400;

    fn at(day: i64, hour: i64) -> i64 {
        MONDAY + (day - 1) * DAY + hour * 3600
    }

    fn event(subject: &str, ts: i64, kind: EventKind) -> Event {
        Event {
            subject_id: SubjectId::new(subject).unwrap(),
            source_record_id: RecordId::new(format!("{subject}-{ts}")).unwrap(),
            timestamp: ts,
            kind,
            label: kind.describe(),
        }
    }

    fn points(subject: &str, ts: i64, old: f64, new: f64) -> Event {
        event(subject, ts, EventKind::PointsChange { old, new })
    }

    /// Sprint covering days 1..=n, bucketed in UTC.
    fn sprint(days: i64) -> DateBucketizer<Utc> {
        let window = SprintWindow::new(at(1, 0), at(days, 23)).unwrap();
        DateBucketizer::new(window, Utc).unwrap()
    }

    fn run(bucketizer: &DateBucketizer<Utc>, events: &[Event]) -> Vec<DateBucket> {
        SeriesAccumulator::new(bucketizer).accumulate(events, bucketizer.build())
    }

    fn days<T>(buckets: &[DateBucket], f: impl Fn(&DateBucket) -> T) -> Vec<T> {
        buckets[1..buckets.len() - 1].iter().map(f).collect()
    }

    #[test]
    fn task_added_then_closed() {
        let b = sprint(5);
        let buckets = run(
            &b,
            &[
                points("T1", at(1, 9), 0.0, 5.0),
                event("T1", at(1, 9), EventKind::ScopeAdd),
                event("T1", at(3, 12), EventKind::Close),
            ],
        );

        assert_eq!(days(&buckets, |d| d.total_points), vec![5.0; 5]);
        assert_eq!(
            days(&buckets, |d| d.remaining_points),
            vec![5.0, 5.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(days(&buckets, |d| d.remaining_tasks), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn points_change_while_in_scope_and_open() {
        let b = sprint(3);
        let buckets = run(
            &b,
            &[
                event("T1", at(1, 9), EventKind::ScopeAdd),
                points("T1", at(1, 9), 0.0, 3.0),
                points("T1", at(2, 9), 3.0, 7.0),
            ],
        );

        assert_eq!(days(&buckets, |d| d.total_points), vec![3.0, 7.0, 7.0]);
        assert_eq!(days(&buckets, |d| d.remaining_points), vec![3.0, 7.0, 7.0]);
    }

    #[test]
    fn removal_restores_baseline() {
        let b = sprint(4);
        let buckets = run(
            &b,
            &[
                points("base", at(0, 0), 0.0, 2.0),
                event("base", at(0, 0), EventKind::ScopeAdd),
                points("T1", at(1, 8), 0.0, 4.0),
                event("T1", at(1, 9), EventKind::ScopeAdd),
                event("T1", at(2, 9), EventKind::ScopeRemove),
            ],
        );

        assert_eq!(buckets[0].total_points, 2.0);
        assert_eq!(days(&buckets, |d| d.total_points), vec![6.0, 2.0, 2.0, 2.0]);
        assert_eq!(days(&buckets, |d| d.remaining_points), vec![6.0, 2.0, 2.0, 2.0]);
        assert_eq!(days(&buckets, |d| d.total_tasks), vec![2, 1, 1, 1]);
        assert!(buckets.iter().all(|d| d.closed_tasks_today == 0));
    }

    #[test]
    fn points_change_out_of_scope_only_updates_state() {
        let b = sprint(2);
        let subject = SubjectId::new("T1").unwrap();
        let mut acc = SeriesAccumulator::new(&b);
        let buckets = acc.accumulate(&[points("T1", at(1, 9), 0.0, 8.0)], b.build());

        assert!(buckets.iter().all(|d| d.added_points_today == 0.0));
        assert!(buckets.iter().all(|d| d.closed_points_today == 0.0));
        assert_eq!(acc.task_state(&subject).unwrap().current_points, 8.0);
    }

    #[test]
    fn points_change_on_closed_task_adjusts_completed() {
        let b = sprint(3);
        let buckets = run(
            &b,
            &[
                points("T1", at(1, 8), 0.0, 3.0),
                event("T1", at(1, 9), EventKind::ScopeAdd),
                event("T1", at(2, 9), EventKind::Close),
                points("T1", at(3, 9), 3.0, 5.0),
            ],
        );

        assert_eq!(buckets[3].added_points_today, 2.0);
        assert_eq!(buckets[3].closed_points_today, 2.0);
        assert_eq!(days(&buckets, |d| d.total_points), vec![3.0, 3.0, 5.0]);
        assert_eq!(days(&buckets, |d| d.remaining_points), vec![3.0, 0.0, 0.0]);
    }

    #[test]
    fn reopen_undoes_close() {
        let b = sprint(3);
        let buckets = run(
            &b,
            &[
                points("T1", at(1, 8), 0.0, 2.0),
                event("T1", at(1, 9), EventKind::ScopeAdd),
                event("T1", at(2, 9), EventKind::Close),
                event("T1", at(3, 9), EventKind::Reopen),
            ],
        );

        assert_eq!(days(&buckets, |d| d.remaining_points), vec![2.0, 0.0, 2.0]);
        assert_eq!(days(&buckets, |d| d.remaining_tasks), vec![1, 0, 1]);
    }

    #[test]
    fn create_events_do_not_move_totals() {
        let b = sprint(2);
        let buckets = run(&b, &[event("T1", at(1, 9), EventKind::Create)]);

        assert!(buckets.iter().all(|d| d.total_tasks == 0 && d.total_points == 0.0));
    }

    #[test]
    fn events_outside_window_land_in_overflow_buckets() {
        let b = sprint(2);
        let buckets = run(
            &b,
            &[
                event("T1", at(0, 12), EventKind::ScopeAdd),
                event("T2", at(5, 12), EventKind::ScopeAdd),
            ],
        );

        assert_eq!(buckets[0].added_tasks_today, 1);
        assert_eq!(buckets[3].added_tasks_today, 1);
        assert_eq!(buckets[3].total_tasks, 2);
    }

    #[test]
    fn seeded_subjects_start_empty() {
        let b = sprint(1);
        let subject = SubjectId::new("T9").unwrap();
        let acc = SeriesAccumulator::new(&b).with_subjects([subject.clone()]);

        assert_eq!(acc.task_state(&subject), Some(&TaskState::default()));
    }

    #[test]
    fn remaining_is_total_minus_completed() {
        let b = sprint(5);
        let buckets = run(
            &b,
            &[
                points("A", at(0, 1), 0.0, 3.0),
                event("A", at(0, 1), EventKind::ScopeAdd),
                points("B", at(1, 1), 0.0, 5.0),
                event("B", at(1, 2), EventKind::ScopeAdd),
                event("A", at(2, 1), EventKind::Close),
                points("B", at(3, 1), 5.0, 8.0),
                event("B", at(4, 1), EventKind::Close),
                event("A", at(4, 2), EventKind::Reopen),
            ],
        );

        let mut completed_points = 0.0;
        let mut completed_tasks = 0;
        for bucket in &buckets {
            completed_points += bucket.closed_points_today;
            completed_tasks += bucket.closed_tasks_today;
            assert_eq!(bucket.remaining_points, bucket.total_points - completed_points);
            assert_eq!(bucket.remaining_tasks, bucket.total_tasks - completed_tasks);
        }
    }
}
