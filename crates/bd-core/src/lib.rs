//! Core domain logic for sprint burndown charts.
//!
//! This crate contains the fundamental types and logic for:
//! - Classification: turning raw task mutation records into burndown events
//! - Bucketing: mapping a sprint window onto calendar days in a time zone
//! - Accumulation: per-day deltas, running totals and the ideal baseline
//!
//! Storage stays outside this crate behind the collaborator traits in
//! [`engine`].

mod accumulate;
pub mod bucket;
pub mod classify;
pub mod engine;
mod error;
pub mod event;
mod ideal;
pub mod record;
pub mod types;

pub use accumulate::{SeriesAccumulator, TaskState, fill_running_totals};
pub use bucket::{BucketKind, DateBucket, DateBucketizer, SprintWindow};
pub use classify::{ClassifierConfig, ClosedStatuses, EventClassifier, StatusPolicy, extract_events};
pub use engine::{
    BurndownEngine, BurndownReport, MutationLogRepository, SprintWindowProvider, Task,
    TaskRepository, build_series,
};
pub use error::{BurndownError, RepositoryError};
pub use event::{Event, EventKind};
pub use ideal::apply_ideal_baseline;
pub use record::{MutationKind, MutationRecord};
pub use types::{RecordId, ScopeId, SubjectId, ValidationError};
