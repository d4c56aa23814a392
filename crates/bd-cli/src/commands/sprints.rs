//! Sprints command for listing sprints and their windows.
//!
//! This module implements `burndown sprints`, the list of every scope that
//! is a sprint along with its configured start and end.

use std::fmt::{Display, Write};

use anyhow::Result;
use bd_db::{Database, ScopeRecord};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

use super::util::display_width;

/// Sprint entry for JSON output.
#[derive(Debug, Serialize)]
pub struct JsonSprint {
    pub id: String,
    pub name: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

fn format_instant<Tz: TimeZone>(timestamp: Option<i64>, tz: &Tz) -> Option<String>
where
    Tz::Offset: Display,
{
    let at = DateTime::from_timestamp(timestamp?, 0)?;
    Some(at.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string())
}

/// Formats the sprint list for the terminal, with times in `tz`.
pub fn format_sprints<Tz: TimeZone>(sprints: &[ScopeRecord], tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mut output = String::new();

    writeln!(output, "SPRINTS").unwrap();
    writeln!(output, "───────").unwrap();

    if sprints.is_empty() {
        writeln!(output, "(no sprints)").unwrap();
        return output;
    }

    let name_width = sprints.iter().map(|s| display_width(&s.name)).max().unwrap_or(0);
    for sprint in sprints {
        let window = match (
            format_instant(sprint.sprint_start, tz),
            format_instant(sprint.sprint_end, tz),
        ) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "(dates not set)".to_string(),
        };
        writeln!(
            output,
            "  {:<name_width$}  {window}  [{}]",
            sprint.name, sprint.id
        )
        .unwrap();
    }

    output
}

/// Formats the sprint list as JSON. Times are RFC 3339 in UTC.
pub fn format_sprints_json(sprints: &[ScopeRecord]) -> Result<String> {
    let rfc3339 = |ts: Option<i64>| {
        ts.and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.to_rfc3339())
    };
    let entries: Vec<JsonSprint> = sprints
        .iter()
        .map(|s| JsonSprint {
            id: s.id.to_string(),
            name: s.name.clone(),
            start: rfc3339(s.sprint_start),
            end: rfc3339(s.sprint_end),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Runs the sprints command.
pub fn run(db: &Database, json: bool) -> Result<()> {
    let sprints = db.list_sprints()?;
    if json {
        println!("{}", format_sprints_json(&sprints)?);
    } else {
        print!("{}", format_sprints(&sprints, &Local));
    }
    Ok(())
}
