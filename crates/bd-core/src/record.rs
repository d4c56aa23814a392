//! Raw task mutation records as produced by the task store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, SubjectId};

/// Metadata key naming the custom field a field mutation touched.
pub const CUSTOM_FIELD_KEY: &str = "customfield:key";

/// Metadata key naming the edge type of a membership mutation.
pub const EDGE_TYPE_KEY: &str = "edge:type";

/// The kind of change a mutation record describes.
///
/// Unknown kind strings (comments, subscriptions, priority changes) all map to
/// [`MutationKind::Other`] so that a mixed log can be read without filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    StatusChange,
    TitleChange,
    MembershipChange,
    PointsChange,
    Other,
}

impl MutationKind {
    /// String representation for storage and display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::TitleChange => "title_change",
            Self::MembershipChange => "membership_change",
            Self::PointsChange => "points_change",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "status_change" | "status" => Self::StatusChange,
            "title_change" | "title" => Self::TitleChange,
            "membership_change" | "projects" | "edge" => Self::MembershipChange,
            "points_change" | "customfield" => Self::PointsChange,
            _ => Self::Other,
        };
        Ok(kind)
    }
}

impl Serialize for MutationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MutationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let Ok(kind) = s.parse::<Self>();
        Ok(kind)
    }
}

/// One immutable entry of a task's mutation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Unique identifier of this record.
    pub id: RecordId,

    /// The task this record mutated.
    ///
    /// Optional on the wire so that a malformed log is reported instead of
    /// rejected wholesale at parse time.
    #[serde(default)]
    pub subject_id: Option<SubjectId>,

    /// What changed.
    pub kind: MutationKind,

    /// Value before the change (`null` when the field had no prior value).
    #[serde(default)]
    pub old_value: serde_json::Value,

    /// Value after the change.
    #[serde(default)]
    pub new_value: serde_json::Value,

    /// When the change happened, in epoch seconds.
    pub timestamp: i64,

    /// Free-form annotations such as [`CUSTOM_FIELD_KEY`] and [`EDGE_TYPE_KEY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl MutationRecord {
    /// Returns a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip_all_variants() {
        let variants = [
            MutationKind::StatusChange,
            MutationKind::TitleChange,
            MutationKind::MembershipChange,
            MutationKind::PointsChange,
            MutationKind::Other,
        ];

        for variant in &variants {
            let parsed: MutationKind = variant.to_string().parse().unwrap();
            assert_eq!(parsed, *variant, "roundtrip failed for {variant:?}");
        }
    }

    #[test]
    fn unknown_kind_is_other() {
        let parsed: MutationKind = "core:comment".parse().unwrap();
        assert_eq!(parsed, MutationKind::Other);
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{
            "id": "x1",
            "subject_id": "T1",
            "kind": "title_change",
            "new_value": "Write docs",
            "timestamp": 1700000000
        }"#;
        let record: MutationRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.kind, MutationKind::TitleChange);
        assert!(record.old_value.is_null());
        assert!(record.metadata.is_empty());
        assert_eq!(record.subject_id.unwrap().as_str(), "T1");
    }

    #[test]
    fn record_without_subject_still_parses() {
        let json = r#"{"id": "x2", "kind": "subscribers", "timestamp": 1}"#;
        let record: MutationRecord = serde_json::from_str(json).unwrap();

        assert!(record.subject_id.is_none());
        assert_eq!(record.kind, MutationKind::Other);
    }

    #[test]
    fn metadata_value_lookup() {
        let json = r#"{
            "id": "x3",
            "subject_id": "T1",
            "kind": "points_change",
            "timestamp": 1,
            "metadata": {"customfield:key": "isdc:sprint:storypoints"}
        }"#;
        let record: MutationRecord = serde_json::from_str(json).unwrap();

        assert_eq!(
            record.metadata_value(CUSTOM_FIELD_KEY),
            Some("isdc:sprint:storypoints")
        );
        assert_eq!(record.metadata_value(EDGE_TYPE_KEY), None);
    }
}
