//! CLI subcommand implementations.

pub mod events;
pub mod import;
pub mod report;
pub mod sprint;
pub mod sprints;
pub mod util;
