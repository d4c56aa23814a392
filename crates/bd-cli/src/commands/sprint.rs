//! Sprint command for setting a sprint's start and end.

use anyhow::Result;
use bd_core::SprintWindow;
use bd_db::Database;
use chrono::{DateTime, Utc};

use super::util::{parse_sprint_bound, require_scope};

/// Sets the sprint window of `scope` from user-supplied boundaries.
pub fn set(db: &mut Database, scope: &str, start: &str, end: &str) -> Result<SprintWindow> {
    let start = parse_sprint_bound(start, false)?;
    let end = parse_sprint_bound(end, true)?;
    let window = set_window(db, scope, start, end)?;

    println!(
        "Sprint window set for {scope}: {} to {}",
        start.to_rfc3339(),
        end.to_rfc3339()
    );
    Ok(window)
}

fn set_window(
    db: &mut Database,
    scope: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<SprintWindow> {
    let record = require_scope(db, scope)?;
    if !record.is_sprint() {
        anyhow::bail!(
            "{} is not a sprint; only scopes named like a sprint can have sprint dates",
            record.name
        );
    }

    let window = SprintWindow::new(start.timestamp(), end.timestamp())?;
    db.set_sprint_window(&record.id, window)?;
    tracing::debug!(scope, start = window.start, end = window.end, "sprint window set");
    Ok(window)
}
