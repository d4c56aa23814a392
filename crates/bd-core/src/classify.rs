//! Classification of raw mutation records into burndown events.
//!
//! A task store records every edit to a task: comments, subscriber changes,
//! title edits, status transitions, project membership and custom fields.
//! Only a handful of those move a burndown chart. [`EventClassifier`] picks
//! them out one record at a time and [`EventClassifier::extract`] turns a whole
//! log into a chronologically sorted [`Event`] sequence.
//!
//! # Rules
//!
//! Rules are keyed on [`MutationKind`] and the first matching arm wins:
//!
//! | Mutation | Condition | Event |
//! |---|---|---|
//! | status | open → closed | `close` |
//! | status | closed → open | `reopen` |
//! | status | no previous value | none (creation) |
//! | title | no previous value | `create` |
//! | membership | scope newly intersected | `scope_add` |
//! | membership | scope no longer intersected | `scope_remove` |
//! | points | custom field key is the points field | `points_change` |
//!
//! Everything else yields no event.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BurndownError;
use crate::event::{Event, EventKind};
use crate::record::{CUSTOM_FIELD_KEY, EDGE_TYPE_KEY, MutationKind, MutationRecord};
use crate::types::ScopeId;

/// Custom field key of the story points field.
pub const DEFAULT_POINTS_FIELD_KEY: &str = "isdc:sprint:storypoints";

/// Status names treated as closed by default.
pub const DEFAULT_CLOSED_STATUSES: [&str; 5] =
    ["resolved", "wontfix", "invalid", "duplicate", "spite"];

/// Decides whether a task status counts as closed.
pub trait StatusPolicy {
    /// Returns true if `status` is a closed status.
    fn is_closed_status(&self, status: &str) -> bool;
}

/// A fixed set of closed status names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosedStatuses(BTreeSet<String>);

impl ClosedStatuses {
    /// Creates a policy from status names.
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(statuses.into_iter().map(Into::into).collect())
    }
}

impl Default for ClosedStatuses {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSED_STATUSES)
    }
}

impl StatusPolicy for ClosedStatuses {
    fn is_closed_status(&self, status: &str) -> bool {
        self.0.contains(status)
    }
}

/// Configuration for event classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Value of the `customfield:key` metadata that identifies the points field.
    pub points_field_key: String,

    /// Edge type membership mutations must carry, if they carry one at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_edge_type: Option<String>,

    /// Statuses considered closed.
    #[serde(default)]
    pub closed_statuses: ClosedStatuses,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            points_field_key: DEFAULT_POINTS_FIELD_KEY.to_string(),
            membership_edge_type: None,
            closed_statuses: ClosedStatuses::default(),
        }
    }
}

/// Classifies mutation records against a set of scope identifiers.
pub struct EventClassifier<'a> {
    config: &'a ClassifierConfig,
    status_policy: &'a dyn StatusPolicy,
    scope_ids: &'a HashSet<ScopeId>,
}

impl<'a> EventClassifier<'a> {
    /// Creates a classifier using the closed statuses from `config`.
    pub fn new(config: &'a ClassifierConfig, scope_ids: &'a HashSet<ScopeId>) -> Self {
        Self {
            config,
            status_policy: &config.closed_statuses,
            scope_ids,
        }
    }

    /// Replaces the closed-status predicate.
    #[must_use]
    pub fn with_status_policy(mut self, policy: &'a dyn StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Classifies a single record.
    ///
    /// Returns `None` for records that do not affect a burndown, and for
    /// records without a subject (see [`Self::extract`] for validation).
    pub fn classify(&self, record: &MutationRecord) -> Option<Event> {
        let subject_id = record.subject_id.clone()?;

        let kind = match record.kind {
            MutationKind::StatusChange => self.classify_status(record),
            MutationKind::TitleChange => record.old_value.is_null().then_some(EventKind::Create),
            MutationKind::MembershipChange => self.classify_membership(record),
            MutationKind::PointsChange => self.classify_points(record),
            MutationKind::Other => None,
        }?;

        Some(Event {
            subject_id,
            source_record_id: record.id.clone(),
            timestamp: record.timestamp,
            label: label_for(kind, record),
            kind,
        })
    }

    /// Classifies a whole log and sorts the events by timestamp.
    ///
    /// Events sharing a timestamp keep the relative order of their records.
    pub fn extract(&self, records: &[MutationRecord]) -> Result<Vec<Event>, BurndownError> {
        let mut events = Vec::new();
        for record in records {
            if record.subject_id.is_none() {
                return Err(BurndownError::InvalidInput {
                    record: record.id.clone(),
                    reason: "missing subject".to_string(),
                });
            }
            if let Some(event) = self.classify(record) {
                events.push(event);
            }
        }

        // Stable sort: same-second events stay in log order.
        events.sort_by_key(|event| event.timestamp);

        tracing::debug!(
            records = records.len(),
            events = events.len(),
            "extracted burndown events"
        );
        Ok(events)
    }

    fn classify_status(&self, record: &MutationRecord) -> Option<EventKind> {
        let old = status_value(&record.old_value);
        let new = status_value(&record.new_value);

        // A missing previous status compares as closed, so creating a task
        // with an open status shows up as a transition; it is skipped below.
        let old_closed = old
            .as_deref()
            .is_none_or(|status| self.status_policy.is_closed_status(status));
        let new_closed = new
            .as_deref()
            .is_some_and(|status| self.status_policy.is_closed_status(status));

        if old_closed == new_closed || old.is_none() {
            return None;
        }

        if new_closed {
            Some(EventKind::Close)
        } else {
            Some(EventKind::Reopen)
        }
    }

    fn classify_membership(&self, record: &MutationRecord) -> Option<EventKind> {
        if let (Some(expected), Some(actual)) = (
            self.config.membership_edge_type.as_deref(),
            record.metadata_value(EDGE_TYPE_KEY),
        ) {
            if expected != actual {
                return None;
            }
        }

        let old = membership_set(&record.old_value);
        let new = membership_set(&record.new_value);
        let in_old = self.intersects_scope(&old);
        let in_new = self.intersects_scope(&new);

        match (in_old, in_new) {
            (false, true) => Some(EventKind::ScopeAdd),
            (true, false) => Some(EventKind::ScopeRemove),
            _ => None,
        }
    }

    fn classify_points(&self, record: &MutationRecord) -> Option<EventKind> {
        if record.metadata_value(CUSTOM_FIELD_KEY) != Some(self.config.points_field_key.as_str()) {
            return None;
        }

        Some(EventKind::PointsChange {
            old: points_value(record, &record.old_value),
            new: points_value(record, &record.new_value),
        })
    }

    fn intersects_scope(&self, members: &HashSet<String>) -> bool {
        self.scope_ids
            .iter()
            .any(|scope| members.contains(scope.as_str()))
    }
}

/// Classifies `records` against `scope_ids` with the given configuration.
pub fn extract_events(
    records: &[MutationRecord],
    scope_ids: &HashSet<ScopeId>,
    config: &ClassifierConfig,
) -> Result<Vec<Event>, BurndownError> {
    EventClassifier::new(config, scope_ids).extract(records)
}

fn label_for(kind: EventKind, record: &MutationRecord) -> String {
    match kind {
        EventKind::Create => match record.new_value.as_str() {
            Some(title) => format!("created \"{title}\""),
            None => kind.describe(),
        },
        EventKind::Close | EventKind::Reopen => match status_value(&record.new_value) {
            Some(status) => format!("{} as {status}", kind.describe()),
            None => kind.describe(),
        },
        _ => kind.describe(),
    }
}

fn status_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads a membership list: an array of ids, an object keyed by id, or a
/// single id. `null` is the empty set.
fn membership_set(value: &Value) -> HashSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        Value::String(s) => HashSet::from([s.clone()]),
        _ => HashSet::new(),
    }
}

/// Reads a points value. Missing and blank values count as zero.
fn points_value(record: &MutationRecord, value: &Value) -> f64 {
    let parsed = match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|p| p.is_finite()),
        _ => None,
    };

    parsed.unwrap_or_else(|| {
        tracing::warn!(record = %record.id, %value, "non-numeric points value, using 0");
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordId, SubjectId};
    use serde_json::json;
    use std::collections::BTreeMap;

    const SCOPE: &str = "PHID-PROJ-sprint";

    fn record(id: &str, kind: MutationKind, old: Value, new: Value, ts: i64) -> MutationRecord {
        MutationRecord {
            id: RecordId::new(id).unwrap(),
            subject_id: Some(SubjectId::new("T1").unwrap()),
            kind,
            old_value: old,
            new_value: new,
            timestamp: ts,
            metadata: BTreeMap::new(),
        }
    }

    fn points(id: &str, old: Value, new: Value, ts: i64) -> MutationRecord {
        let mut r = record(id, MutationKind::PointsChange, old, new, ts);
        r.metadata
            .insert(CUSTOM_FIELD_KEY.to_string(), DEFAULT_POINTS_FIELD_KEY.to_string());
        r
    }

    fn scope_set() -> HashSet<ScopeId> {
        HashSet::from([ScopeId::new(SCOPE).unwrap()])
    }

    fn classify(r: &MutationRecord) -> Option<EventKind> {
        let config = ClassifierConfig::default();
        let scopes = scope_set();
        EventClassifier::new(&config, &scopes)
            .classify(r)
            .map(|e| e.kind)
    }

    // ========== Status ==========

    #[test]
    fn open_to_closed_is_close() {
        let r = record("x", MutationKind::StatusChange, json!("open"), json!("resolved"), 1);
        assert_eq!(classify(&r), Some(EventKind::Close));
    }

    #[test]
    fn closed_to_open_is_reopen() {
        let r = record("x", MutationKind::StatusChange, json!("wontfix"), json!("open"), 1);
        assert_eq!(classify(&r), Some(EventKind::Reopen));
    }

    #[test]
    fn same_side_status_changes_are_ignored() {
        let open = record("x", MutationKind::StatusChange, json!("open"), json!("stalled"), 1);
        let closed = record("y", MutationKind::StatusChange, json!("resolved"), json!("invalid"), 1);
        assert_eq!(classify(&open), None);
        assert_eq!(classify(&closed), None);
    }

    #[test]
    fn initial_status_is_not_an_event() {
        let created_open = record("x", MutationKind::StatusChange, Value::Null, json!("open"), 1);
        let created_closed =
            record("y", MutationKind::StatusChange, Value::Null, json!("resolved"), 1);
        assert_eq!(classify(&created_open), None);
        assert_eq!(classify(&created_closed), None);
    }

    #[test]
    fn custom_status_policy_is_used() {
        struct DoneOnly;
        impl StatusPolicy for DoneOnly {
            fn is_closed_status(&self, status: &str) -> bool {
                status == "done"
            }
        }

        let config = ClassifierConfig::default();
        let scopes = scope_set();
        let classifier = EventClassifier::new(&config, &scopes).with_status_policy(&DoneOnly);

        let r = record("x", MutationKind::StatusChange, json!("open"), json!("done"), 1);
        assert_eq!(classifier.classify(&r).map(|e| e.kind), Some(EventKind::Close));

        let r = record("y", MutationKind::StatusChange, json!("open"), json!("resolved"), 1);
        assert_eq!(classifier.classify(&r), None);
    }

    #[test]
    fn close_label_names_new_status() {
        let config = ClassifierConfig::default();
        let scopes = scope_set();
        let r = record("x", MutationKind::StatusChange, json!("open"), json!("resolved"), 1);
        let event = EventClassifier::new(&config, &scopes).classify(&r).unwrap();
        assert_eq!(event.label, "closed as resolved");
    }

    // ========== Title ==========

    #[test]
    fn first_title_is_create() {
        let r = record("x", MutationKind::TitleChange, Value::Null, json!("Fix login"), 1);
        assert_eq!(classify(&r), Some(EventKind::Create));
    }

    #[test]
    fn retitle_is_ignored() {
        let r = record("x", MutationKind::TitleChange, json!("Old"), json!("New"), 1);
        assert_eq!(classify(&r), None);
    }

    // ========== Membership ==========

    #[test]
    fn joining_scope_is_scope_add() {
        let r = record(
            "x",
            MutationKind::MembershipChange,
            json!(["PHID-PROJ-other"]),
            json!(["PHID-PROJ-other", SCOPE]),
            1,
        );
        assert_eq!(classify(&r), Some(EventKind::ScopeAdd));
    }

    #[test]
    fn leaving_scope_is_scope_remove() {
        let r = record(
            "x",
            MutationKind::MembershipChange,
            json!([SCOPE]),
            Value::Null,
            1,
        );
        assert_eq!(classify(&r), Some(EventKind::ScopeRemove));
    }

    #[test]
    fn unrelated_membership_change_is_ignored() {
        let r = record(
            "x",
            MutationKind::MembershipChange,
            json!([SCOPE]),
            json!([SCOPE, "PHID-PROJ-other"]),
            1,
        );
        assert_eq!(classify(&r), None);
    }

    #[test]
    fn membership_accepts_keyed_objects() {
        let r = record(
            "x",
            MutationKind::MembershipChange,
            json!({}),
            json!({ "PHID-PROJ-sprint": { "dst": SCOPE } }),
            1,
        );
        assert_eq!(classify(&r), Some(EventKind::ScopeAdd));
    }

    #[test]
    fn membership_with_other_edge_type_is_ignored() {
        let config = ClassifierConfig {
            membership_edge_type: Some("41".to_string()),
            ..ClassifierConfig::default()
        };
        let scopes = scope_set();
        let classifier = EventClassifier::new(&config, &scopes);

        let mut r = record("x", MutationKind::MembershipChange, Value::Null, json!([SCOPE]), 1);
        r.metadata.insert(EDGE_TYPE_KEY.to_string(), "3".to_string());
        assert_eq!(classifier.classify(&r), None);

        r.metadata.insert(EDGE_TYPE_KEY.to_string(), "41".to_string());
        assert_eq!(classifier.classify(&r).map(|e| e.kind), Some(EventKind::ScopeAdd));
    }

    // ========== Points ==========

    #[test]
    fn points_field_change_is_points_change() {
        let r = points("x", json!(3), json!("7"), 1);
        assert_eq!(
            classify(&r),
            Some(EventKind::PointsChange { old: 3.0, new: 7.0 })
        );
    }

    #[test]
    fn initial_points_count_from_zero() {
        let r = points("x", Value::Null, json!(5), 1);
        assert_eq!(
            classify(&r),
            Some(EventKind::PointsChange { old: 0.0, new: 5.0 })
        );
    }

    #[test]
    fn non_numeric_points_count_as_zero() {
        let r = points("x", json!("lots"), json!(""), 1);
        assert_eq!(
            classify(&r),
            Some(EventKind::PointsChange { old: 0.0, new: 0.0 })
        );
    }

    #[test]
    fn other_custom_field_is_ignored() {
        let mut r = points("x", json!(1), json!(2), 1);
        r.metadata
            .insert(CUSTOM_FIELD_KEY.to_string(), "isdc:sprint:enddate".to_string());
        assert_eq!(classify(&r), None);
    }

    #[test]
    fn other_mutations_are_ignored() {
        let r = record("x", MutationKind::Other, json!(null), json!("a comment"), 1);
        assert_eq!(classify(&r), None);
    }

    #[test]
    fn classification_is_idempotent() {
        let config = ClassifierConfig::default();
        let scopes = scope_set();
        let classifier = EventClassifier::new(&config, &scopes);
        let r = points("x", json!(1), json!(4), 10);

        assert_eq!(classifier.classify(&r), classifier.classify(&r));
    }

    // ========== Extraction ==========

    #[test]
    fn extract_sorts_by_timestamp() {
        let records = vec![
            record("late", MutationKind::StatusChange, json!("open"), json!("resolved"), 30),
            record("early", MutationKind::TitleChange, Value::Null, json!("Task"), 10),
            record("comment", MutationKind::Other, Value::Null, json!("hi"), 20),
        ];

        let events = extract_events(&records, &scope_set(), &ClassifierConfig::default()).unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.source_record_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn extract_keeps_input_order_for_equal_timestamps() {
        let records = vec![
            points("b", Value::Null, json!(3), 5),
            record("a", MutationKind::MembershipChange, Value::Null, json!([SCOPE]), 5),
            record("c", MutationKind::TitleChange, Value::Null, json!("Task"), 5),
        ];

        let events = extract_events(&records, &scope_set(), &ClassifierConfig::default()).unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.source_record_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn extract_rejects_missing_subject() {
        let mut r = record("broken", MutationKind::Other, Value::Null, Value::Null, 1);
        r.subject_id = None;

        let err = extract_events(&[r], &scope_set(), &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, BurndownError::InvalidInput { .. }));
        assert!(err.to_string().contains("broken"));
    }
}
