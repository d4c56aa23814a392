//! Events command: the burndown events of a scope as JSONL.
//!
//! Unlike `report`, this needs no sprint window, so it works for any scope.

use std::collections::HashSet;
use std::fmt::Write;

use anyhow::Result;
use bd_core::{ClassifierConfig, Event, SubjectId, extract_events};
use bd_db::Database;

use super::util::require_scope;

/// Extracts the events of every task in `scope`, in chronological order.
pub fn scope_events(db: &Database, config: &ClassifierConfig, scope: &str) -> Result<Vec<Event>> {
    let record = require_scope(db, scope)?;
    let tasks = db.list_tasks_in_scope(&record.id)?;
    let subjects: Vec<SubjectId> = tasks.into_iter().map(|t| t.id).collect();
    let records = db.list_mutations(&subjects)?;

    let scope_ids = HashSet::from([record.id]);
    Ok(extract_events(&records, &scope_ids, config)?)
}

/// Formats events as one JSON object per line.
pub fn format_events_jsonl(events: &[Event]) -> Result<String> {
    let mut output = String::new();
    for event in events {
        writeln!(output, "{}", serde_json::to_string(event)?)?;
    }
    Ok(output)
}

/// Runs the events command.
pub fn run(db: &Database, config: &ClassifierConfig, scope: &str) -> Result<()> {
    let events = scope_events(db, config, scope)?;
    print!("{}", format_events_jsonl(&events)?);
    Ok(())
}
