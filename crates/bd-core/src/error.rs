//! Errors produced while building a burndown series.

use thiserror::Error;

use crate::bucket::MAX_SPRINT_DAYS;
use crate::types::{RecordId, ScopeId};

/// Boxed error from a storage collaborator.
pub type RepositoryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Burndown computation errors.
#[derive(Debug, Error)]
pub enum BurndownError {
    /// The scope has no sprint start or end date.
    #[error(
        "{scope} is not set up for burndowns: set the sprint start and end dates first"
    )]
    SprintNotConfigured { scope: ScopeId },

    /// The scope has no tasks to chart.
    #[error("{scope} has no tasks, so there is nothing to chart")]
    EmptyTaskSet { scope: ScopeId },

    /// A mutation record could not be interpreted.
    #[error("invalid mutation record {record}: {reason}")]
    InvalidInput { record: RecordId, reason: String },

    /// The sprint window cannot be bucketed.
    #[error(
        "invalid sprint window {start}..{end}: the end must not precede the start \
         and a sprint spans at most {max} days",
        max = MAX_SPRINT_DAYS
    )]
    InvalidSprintWindow { start: i64, end: i64 },

    /// A storage collaborator failed.
    #[error("failed to load burndown data")]
    Repository(#[source] RepositoryError),
}

impl BurndownError {
    /// Whether the error describes a scope configuration problem the user can fix,
    /// as opposed to a failure of the data or the storage.
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SprintNotConfigured { .. } | Self::EmptyTaskSet { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_user_facing() {
        let scope = ScopeId::new("PHID-PROJ-1").unwrap();
        assert!(BurndownError::SprintNotConfigured { scope: scope.clone() }.is_user_facing());
        assert!(BurndownError::EmptyTaskSet { scope }.is_user_facing());
    }

    #[test]
    fn invalid_window_names_the_limit() {
        let err = BurndownError::InvalidSprintWindow { start: 10, end: 5 };
        assert!(!err.is_user_facing());
        assert_eq!(
            err.to_string(),
            "invalid sprint window 10..5: the end must not precede the start and a sprint spans at most 366 days"
        );
    }

    #[test]
    fn data_errors_are_not_user_facing() {
        let err = BurndownError::InvalidInput {
            record: RecordId::new("x1").unwrap(),
            reason: "missing subject".into(),
        };
        assert!(!err.is_user_facing());
        assert_eq!(err.to_string(), "invalid mutation record x1: missing subject");
    }
}
