//! Burndown events derived from mutation records.

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, SubjectId};

/// A change to a task that matters to a burndown series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The task the event is about.
    pub subject_id: SubjectId,
    /// The mutation record this event was classified from.
    pub source_record_id: RecordId,
    /// When the underlying mutation happened, in epoch seconds.
    pub timestamp: i64,
    /// What happened.
    pub kind: EventKind,
    /// Human-readable description for event listings.
    pub label: String,
}

/// The burndown-relevant kinds of task change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The task was created. Informational only.
    Create,
    /// The task joined the scope.
    ScopeAdd,
    /// The task left the scope.
    ScopeRemove,
    /// The task moved from an open to a closed status.
    Close,
    /// The task moved from a closed to an open status.
    Reopen,
    /// The story points field changed.
    PointsChange { old: f64, new: f64 },
}

impl EventKind {
    /// Default display label for this kind of event.
    pub fn describe(&self) -> String {
        match self {
            Self::Create => "created".to_string(),
            Self::ScopeAdd => "added to scope".to_string(),
            Self::ScopeRemove => "removed from scope".to_string(),
            Self::Close => "closed".to_string(),
            Self::Reopen => "reopened".to_string(),
            Self::PointsChange { old, new } => format!("points changed from {old} to {new}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event {
            subject_id: SubjectId::new("T1").unwrap(),
            source_record_id: RecordId::new("x1").unwrap(),
            timestamp: 1_700_000_000,
            kind: EventKind::PointsChange { old: 3.0, new: 5.0 },
            label: "points changed from 3 to 5".into(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
    }

    #[test]
    fn kind_uses_type_tag() {
        let json = serde_json::to_string(&EventKind::ScopeAdd).unwrap();
        assert_eq!(json, r#"{"type":"scope_add"}"#);
    }

    #[test]
    fn describe_points_change_drops_trailing_zero() {
        let kind = EventKind::PointsChange { old: 3.0, new: 7.5 };
        assert_eq!(kind.describe(), "points changed from 3 to 7.5");
    }

    #[test]
    fn membership_labels_name_the_scope() {
        assert_eq!(EventKind::ScopeAdd.describe(), "added to scope");
        assert_eq!(EventKind::ScopeRemove.describe(), "removed from scope");
    }
}
