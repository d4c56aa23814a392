//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sprint burndown charts.
///
/// Replays task history (status changes, sprint membership and story point
/// edits) into a day-by-day burndown for each sprint.
#[derive(Debug, Parser)]
#[command(name = "burndown", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import scopes, tasks and mutation records from JSONL on stdin.
    ///
    /// Each line is an object tagged with "type": "scope", "task" or "mutation".
    Import,

    /// Configure a sprint.
    #[command(subcommand)]
    Sprint(SprintAction),

    /// List sprints and their windows.
    Sprints {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the burndown for a sprint.
    Report {
        /// Scope ID of the sprint.
        scope: String,

        /// Output as JSON, including the chart series.
        #[arg(long)]
        json: bool,
    },

    /// Print the burndown events of a scope as JSONL.
    Events {
        /// Scope ID.
        scope: String,
    },
}

/// Sprint configuration actions.
#[derive(Debug, Subcommand)]
pub enum SprintAction {
    /// Set the start and end of a sprint.
    Set {
        /// Scope ID of the sprint.
        scope: String,

        /// Sprint start (ISO 8601, YYYY-MM-DD or relative like '3 days ago').
        #[arg(long)]
        start: String,

        /// Sprint end (ISO 8601, YYYY-MM-DD for the end of that day, or relative).
        #[arg(long)]
        end: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sprint_set() {
        let cli = Cli::try_parse_from([
            "burndown",
            "sprint",
            "set",
            "PHID-PROJ-1",
            "--start",
            "2025-06-02",
            "--end",
            "2025-06-13",
        ])
        .unwrap();

        let Some(Commands::Sprint(SprintAction::Set { scope, start, end })) = cli.command else {
            panic!("expected sprint set");
        };
        assert_eq!(scope, "PHID-PROJ-1");
        assert_eq!(start, "2025-06-02");
        assert_eq!(end, "2025-06-13");
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["burndown", "report", "P1", "--json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Report { json: true, .. })));
    }
}
