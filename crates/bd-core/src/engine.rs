//! Burndown computation over pluggable task and history sources.
//!
//! The engine does no I/O of its own. Storage backends implement
//! [`TaskRepository`], [`MutationLogRepository`] and [`SprintWindowProvider`];
//! the engine loads through them, then runs the pure pipeline:
//!
//! ```text
//! records ─▶ extract ─▶ events ─▶ accumulate ─▶ running totals ─▶ ideal baseline
//! ```
//!
//! Everything is computed into local values and only returned once complete.

use std::collections::HashSet;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};

use crate::accumulate::SeriesAccumulator;
use crate::bucket::{DateBucket, DateBucketizer, SprintWindow};
use crate::classify::{ClassifierConfig, EventClassifier};
use crate::error::BurndownError;
use crate::event::Event;
use crate::ideal::apply_ideal_baseline;
use crate::record::MutationRecord;
use crate::types::{ScopeId, SubjectId};

/// A task as known to the task store.
///
/// Apart from `id`, the engine passes these fields through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: SubjectId,
    /// Short reference such as `T42`.
    pub monogram: String,
    pub title: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Loads the tasks that currently belong to a scope.
pub trait TaskRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    fn tasks_in_scope(&self, scope: &ScopeId) -> Result<Vec<Task>, Self::Error>;
}

/// Loads the mutation history of a set of tasks, in any order.
pub trait MutationLogRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    fn for_subjects(&self, subjects: &[SubjectId]) -> Result<Vec<MutationRecord>, Self::Error>;
}

/// Looks up the sprint window configured for a scope.
pub trait SprintWindowProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns `None` if the scope has no complete sprint window.
    fn window_for(&self, scope: &ScopeId) -> Result<Option<SprintWindow>, Self::Error>;
}

/// A finished burndown for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurndownReport {
    pub scope_id: ScopeId,
    pub window: SprintWindow,
    /// Before bucket, one bucket per sprint day, after bucket.
    pub buckets: Vec<DateBucket>,
    /// Events in the order they were applied.
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
}

/// Computes burndown reports.
#[derive(Debug, Clone, Default)]
pub struct BurndownEngine {
    config: ClassifierConfig,
}

impl BurndownEngine {
    /// Creates an engine with the given classification rules.
    pub const fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// The classification rules in use.
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Loads everything for `scope` and computes its burndown, bucketing days
    /// in `tz`.
    pub fn report<T, M, W, Tz>(
        &self,
        scope: &ScopeId,
        tasks: &T,
        log: &M,
        windows: &W,
        tz: Tz,
    ) -> Result<BurndownReport, BurndownError>
    where
        T: TaskRepository,
        M: MutationLogRepository,
        W: SprintWindowProvider,
        Tz: TimeZone,
    {
        let window = windows
            .window_for(scope)
            .map_err(|e| BurndownError::Repository(Box::new(e)))?
            .ok_or_else(|| BurndownError::SprintNotConfigured {
                scope: scope.clone(),
            })?;

        let tasks = tasks
            .tasks_in_scope(scope)
            .map_err(|e| BurndownError::Repository(Box::new(e)))?;
        if tasks.is_empty() {
            return Err(BurndownError::EmptyTaskSet {
                scope: scope.clone(),
            });
        }

        let subjects: Vec<SubjectId> = tasks.iter().map(|task| task.id.clone()).collect();
        let records = log
            .for_subjects(&subjects)
            .map_err(|e| BurndownError::Repository(Box::new(e)))?;

        tracing::debug!(
            %scope,
            tasks = tasks.len(),
            records = records.len(),
            "loaded burndown inputs"
        );

        let scope_ids = HashSet::from([scope.clone()]);
        let events = EventClassifier::new(&self.config, &scope_ids).extract(&records)?;
        let buckets = build_series(window, &events, subjects, tz)?;

        Ok(BurndownReport {
            scope_id: scope.clone(),
            window,
            buckets,
            events,
            tasks,
        })
    }
}

/// Computes the finished bucket series for already-extracted events.
///
/// `subjects` is the task universe; every task starts at zero points, open
/// and out of scope.
pub fn build_series<Tz, I>(
    window: SprintWindow,
    events: &[Event],
    subjects: I,
    tz: Tz,
) -> Result<Vec<DateBucket>, BurndownError>
where
    Tz: TimeZone,
    I: IntoIterator<Item = SubjectId>,
{
    let bucketizer = DateBucketizer::new(window, tz)?;
    let mut buckets = SeriesAccumulator::new(&bucketizer)
        .with_subjects(subjects)
        .accumulate(events, bucketizer.build());
    apply_ideal_baseline(&mut buckets);
    Ok(buckets)
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "point values in these fixtures are small integers"
)]
mod tests {
    use super::*;
    use crate::classify::DEFAULT_POINTS_FIELD_KEY;
    use crate::record::{CUSTOM_FIELD_KEY, MutationKind};
    use crate::types::RecordId;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::collections::{BTreeMap, HashMap};
    use std::convert::Infallible;

    const DAY: i64 = 86_400;
    /// Monday June 2 2025, 00:00 UTC.
    const MONDAY: i64 = 1_748_822_400;
    const SCOPE: &str = "PHID-PROJ-sprint";

    fn at(day: i64, hour: i64) -> i64 {
        MONDAY + (day - 1) * DAY + hour * 3600
    }

    /// In-memory stand-in for a task store.
    #[derive(Default)]
    struct Fixture {
        tasks: Vec<Task>,
        records: Vec<MutationRecord>,
        window: Option<SprintWindow>,
    }

    impl Fixture {
        fn task(mut self, id: &str) -> Self {
            self.tasks.push(Task {
                id: SubjectId::new(id).unwrap(),
                monogram: id.to_string(),
                title: format!("Task {id}"),
                status: "open".to_string(),
                owner: None,
            });
            self
        }

        fn record(
            mut self,
            subject: &str,
            kind: MutationKind,
            old: Value,
            new: Value,
            ts: i64,
        ) -> Self {
            let mut metadata = BTreeMap::new();
            if kind == MutationKind::PointsChange {
                metadata.insert(
                    CUSTOM_FIELD_KEY.to_string(),
                    DEFAULT_POINTS_FIELD_KEY.to_string(),
                );
            }
            let id = format!("x{}", self.records.len());
            self.records.push(MutationRecord {
                id: RecordId::new(id).unwrap(),
                subject_id: Some(SubjectId::new(subject).unwrap()),
                kind,
                old_value: old,
                new_value: new,
                timestamp: ts,
                metadata,
            });
            self
        }

        fn window(mut self, start: i64, end: i64) -> Self {
            self.window = Some(SprintWindow::new(start, end).unwrap());
            self
        }

        fn report(&self) -> Result<BurndownReport, BurndownError> {
            let scope = ScopeId::new(SCOPE).unwrap();
            BurndownEngine::default().report(&scope, self, self, self, Utc)
        }
    }

    impl TaskRepository for Fixture {
        type Error = Infallible;

        fn tasks_in_scope(&self, _scope: &ScopeId) -> Result<Vec<Task>, Self::Error> {
            Ok(self.tasks.clone())
        }
    }

    impl MutationLogRepository for Fixture {
        type Error = Infallible;

        fn for_subjects(
            &self,
            subjects: &[SubjectId],
        ) -> Result<Vec<MutationRecord>, Self::Error> {
            Ok(self
                .records
                .iter()
                .filter(|r| r.subject_id.as_ref().is_some_and(|s| subjects.contains(s)))
                .cloned()
                .collect())
        }
    }

    impl SprintWindowProvider for Fixture {
        type Error = Infallible;

        fn window_for(&self, _scope: &ScopeId) -> Result<Option<SprintWindow>, Self::Error> {
            Ok(self.window)
        }
    }

    /// A task created with `points` and added to the sprint at `ts`.
    fn created(fixture: Fixture, id: &str, points: i64, ts: i64) -> Fixture {
        fixture
            .task(id)
            .record(id, MutationKind::TitleChange, Value::Null, json!("Task"), ts)
            .record(id, MutationKind::StatusChange, Value::Null, json!("open"), ts)
            .record(id, MutationKind::PointsChange, Value::Null, json!(points), ts)
            .record(id, MutationKind::MembershipChange, json!([]), json!([SCOPE]), ts)
    }

    fn days<T>(buckets: &[DateBucket], f: impl Fn(&DateBucket) -> T) -> Vec<T> {
        buckets[1..buckets.len() - 1].iter().map(f).collect()
    }

    #[test]
    fn scenario_close_mid_sprint() {
        let fixture = created(Fixture::default(), "T1", 5, at(1, 10))
            .record(
                "T1",
                MutationKind::StatusChange,
                json!("open"),
                json!("resolved"),
                at(3, 15),
            )
            .window(at(1, 0), at(5, 23));

        let report = fixture.report().unwrap();

        assert_eq!(days(&report.buckets, |b| b.total_points), vec![5.0; 5]);
        assert_eq!(
            days(&report.buckets, |b| b.remaining_points),
            vec![5.0, 5.0, 0.0, 0.0, 0.0]
        );
        // create, scope add, points, close
        assert_eq!(report.events.len(), 4);
    }

    #[test]
    fn scenario_points_raised_while_open() {
        let fixture = created(Fixture::default(), "T1", 3, at(1, 10))
            .record(
                "T1",
                MutationKind::PointsChange,
                json!(3),
                json!(7),
                at(2, 10),
            )
            .window(at(1, 0), at(3, 23));

        let report = fixture.report().unwrap();

        assert_eq!(days(&report.buckets, |b| b.total_points), vec![3.0, 7.0, 7.0]);
        assert_eq!(days(&report.buckets, |b| b.remaining_points), vec![3.0, 7.0, 7.0]);
    }

    #[test]
    fn scenario_added_then_removed() {
        let fixture = created(Fixture::default(), "T0", 2, at(0, 10));
        let fixture = created(fixture, "T1", 4, at(1, 10))
            .record(
                "T1",
                MutationKind::MembershipChange,
                json!([SCOPE]),
                json!([]),
                at(2, 10),
            )
            .window(at(1, 0), at(3, 23));

        let report = fixture.report().unwrap();

        assert_eq!(report.buckets[0].total_points, 2.0);
        assert_eq!(days(&report.buckets, |b| b.total_points), vec![6.0, 2.0, 2.0]);
        assert_eq!(days(&report.buckets, |b| b.remaining_points), vec![6.0, 2.0, 2.0]);
        assert!(report.buckets.iter().all(|b| b.closed_tasks_today == 0));
    }

    #[test]
    fn scenario_zero_length_sprint() {
        let fixture = created(Fixture::default(), "T1", 5, at(0, 10)).window(at(1, 9), at(1, 9));

        let report = fixture.report().unwrap();

        assert_eq!(report.buckets.len(), 3);
        assert_eq!(report.buckets[0].ideal_remaining_points, 5.0);
        assert_eq!(report.buckets[1].ideal_remaining_points, 0.0);
        assert_eq!(report.buckets[2].ideal_remaining_points, 0.0);
    }

    #[test]
    fn missing_window_is_not_configured() {
        let fixture = created(Fixture::default(), "T1", 5, at(1, 10));

        let err = fixture.report().unwrap_err();
        assert!(matches!(err, BurndownError::SprintNotConfigured { .. }));
        assert!(err.is_user_facing());
    }

    #[test]
    fn empty_scope_is_rejected() {
        let fixture = Fixture::default().window(at(1, 0), at(5, 0));

        let err = fixture.report().unwrap_err();
        assert!(matches!(err, BurndownError::EmptyTaskSet { .. }));
    }

    #[test]
    fn record_without_subject_fails_the_report() {
        let mut fixture = created(Fixture::default(), "T1", 1, at(1, 10)).window(at(1, 0), at(2, 0));
        fixture.records[0].subject_id = None;

        // The fixture filters by subject, so feed the broken record directly.
        let scope_ids = HashSet::from([ScopeId::new(SCOPE).unwrap()]);
        let config = ClassifierConfig::default();
        let err = EventClassifier::new(&config, &scope_ids)
            .extract(&fixture.records)
            .unwrap_err();
        assert!(matches!(err, BurndownError::InvalidInput { .. }));
    }

    #[test]
    fn repository_errors_propagate() {
        #[derive(Debug, thiserror::Error)]
        #[error("disk on fire")]
        struct Broken;

        struct Failing;
        impl SprintWindowProvider for Failing {
            type Error = Broken;
            fn window_for(&self, _: &ScopeId) -> Result<Option<SprintWindow>, Broken> {
                Err(Broken)
            }
        }

        let fixture = created(Fixture::default(), "T1", 1, at(1, 10));
        let scope = ScopeId::new(SCOPE).unwrap();
        let err = BurndownEngine::default()
            .report(&scope, &fixture, &fixture, &Failing, Utc)
            .unwrap_err();

        assert!(matches!(err, BurndownError::Repository(_)));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn unrelated_subjects_do_not_change_each_other() {
        let base = created(Fixture::default(), "A", 3, at(1, 9))
            .record("A", MutationKind::StatusChange, json!("open"), json!("resolved"), at(2, 9));
        let base = created(base, "B", 5, at(1, 11))
            .record("B", MutationKind::StatusChange, json!("open"), json!("resolved"), at(3, 9))
            .window(at(1, 0), at(4, 23));

        let mut shuffled = Fixture {
            tasks: base.tasks.clone(),
            records: base.records.clone(),
            window: base.window,
        };
        // Move B's history ahead of A's.
        shuffled.records.rotate_left(5);

        let a = base.report().unwrap();
        let b = shuffled.report().unwrap();
        assert_eq!(a.buckets, b.buckets);

        let per_subject = |r: &BurndownReport| {
            let mut map: HashMap<String, Vec<String>> = HashMap::new();
            for e in &r.events {
                map.entry(e.subject_id.to_string())
                    .or_default()
                    .push(e.source_record_id.to_string());
            }
            map
        };
        assert_eq!(per_subject(&a), per_subject(&b));
    }

    #[test]
    fn build_series_without_events_is_flat() {
        let window = SprintWindow::new(at(1, 0), at(2, 0)).unwrap();
        let buckets = build_series(window, &[], Vec::new(), Utc).unwrap();

        assert_eq!(buckets.len(), 4);
        assert!(buckets.iter().all(|b| b.total_points == 0.0 && b.total_tasks == 0));
    }
}
