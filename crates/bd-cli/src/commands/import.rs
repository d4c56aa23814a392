//! Import command for loading task data into the local `SQLite` store.
//!
//! Input is JSONL on stdin, one object per line, tagged by `type`:
//!
//! ```text
//! {"type":"scope","id":"PHID-PROJ-1","name":"Sprint 12","sprint_start":1748822400,"sprint_end":1749254399}
//! {"type":"task","id":"PHID-TASK-1","monogram":"T1","title":"Fix login","status":"open","scopes":["PHID-PROJ-1"]}
//! {"type":"mutation","id":"PHID-XACT-1","subject_id":"PHID-TASK-1","kind":"status","old_value":"open","new_value":"resolved","timestamp":1748950000}
//! ```
//!
//! Lines are applied scopes first, then tasks, then mutations, so a task may
//! appear before the scope it belongs to.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use bd_core::{MutationRecord, ScopeId, SprintWindow, SubjectId, Task};
use bd_db::{Database, is_sprint_name};
use serde::Deserialize;

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub scopes: usize,
    pub tasks: usize,
    pub mutations_read: usize,
    pub mutations_inserted: usize,
}

/// Reads JSONL from stdin and stores it.
pub fn run(db: &mut Database) -> Result<ImportSummary> {
    let stdin = io::stdin();
    let batch = parse_batch(stdin.lock())?;
    let summary = apply_batch(db, &batch)?;

    println!(
        "Imported {} scopes, {} tasks, {} mutation records ({} new)",
        summary.scopes, summary.tasks, summary.mutations_read, summary.mutations_inserted
    );
    Ok(summary)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImportLine {
    Scope(ImportScope),
    Task(ImportTask),
    Mutation(MutationRecord),
}

#[derive(Debug, Deserialize)]
struct ImportScope {
    id: ScopeId,
    name: String,
    #[serde(default)]
    sprint_start: Option<i64>,
    #[serde(default)]
    sprint_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ImportTask {
    id: SubjectId,
    monogram: String,
    title: String,
    status: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    scopes: Vec<ScopeId>,
}

/// Parsed input, grouped by line type in input order.
#[derive(Debug, Default)]
struct ImportBatch {
    scopes: Vec<(ScopeId, String, Option<SprintWindow>)>,
    tasks: Vec<(Task, Vec<ScopeId>)>,
    mutations: Vec<MutationRecord>,
}

fn parse_batch<R: BufRead>(reader: R) -> Result<ImportBatch> {
    let mut batch = ImportBatch::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportLine = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {line_no}"))?;

        match parsed {
            ImportLine::Scope(scope) => {
                let window = scope_window(&scope)
                    .with_context(|| format!("invalid scope on line {line_no}"))?;
                batch.scopes.push((scope.id, scope.name, window));
            }
            ImportLine::Task(task) => batch.tasks.push((
                Task {
                    id: task.id,
                    monogram: task.monogram,
                    title: task.title,
                    status: task.status,
                    owner: task.owner,
                },
                task.scopes,
            )),
            ImportLine::Mutation(record) => {
                if record.subject_id.is_none() {
                    anyhow::bail!("invalid mutation on line {line_no}: missing subject_id");
                }
                batch.mutations.push(record);
            }
        }
    }
    Ok(batch)
}

fn scope_window(scope: &ImportScope) -> Result<Option<SprintWindow>> {
    match (scope.sprint_start, scope.sprint_end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            if !is_sprint_name(&scope.name) {
                anyhow::bail!(
                    "{} is not a sprint; only scopes named like a sprint can have sprint dates",
                    scope.name
                );
            }
            Ok(Some(SprintWindow::new(start, end)?))
        }
        _ => anyhow::bail!("sprint_start and sprint_end must be given together"),
    }
}

fn apply_batch(db: &mut Database, batch: &ImportBatch) -> Result<ImportSummary> {
    for (id, name, window) in &batch.scopes {
        db.upsert_scope(id, name)?;
        if let Some(window) = window {
            db.set_sprint_window(id, *window)?;
        }
    }

    for (task, scopes) in &batch.tasks {
        db.upsert_task(task)?;
        for scope in scopes {
            db.add_task_to_scope(&task.id, scope)
                .with_context(|| format!("task {} references unknown scope {scope}", task.id))?;
        }
    }

    let mutations_inserted = db.insert_mutations(&batch.mutations)?;

    tracing::debug!(
        scopes = batch.scopes.len(),
        tasks = batch.tasks.len(),
        mutations = batch.mutations.len(),
        mutations_inserted,
        "import applied"
    );

    Ok(ImportSummary {
        scopes: batch.scopes.len(),
        tasks: batch.tasks.len(),
        mutations_read: batch.mutations.len(),
        mutations_inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use bd_core::{MutationKind, TaskRepository};
    use std::io::Cursor;

    const INPUT: &str = r#"
{"type":"task","id":"PHID-TASK-1","monogram":"T1","title":"Fix login","status":"open","scopes":["PHID-PROJ-1"]}
{"type":"scope","id":"PHID-PROJ-1","name":"Sprint 12","sprint_start":1748822400,"sprint_end":1749254399}
{"type":"mutation","id":"x1","subject_id":"PHID-TASK-1","kind":"status","old_value":"open","new_value":"resolved","timestamp":1748950000}
{"type":"mutation","id":"x2","subject_id":"PHID-TASK-1","kind":"subscribers","new_value":["alice"],"timestamp":1748950001}
"#;

    #[test]
    fn parse_batch_groups_lines_by_type() {
        let batch = parse_batch(Cursor::new(INPUT)).unwrap();

        assert_eq!(batch.scopes.len(), 1);
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.mutations.len(), 2);
        assert_eq!(batch.mutations[0].kind, MutationKind::StatusChange);
        assert_eq!(batch.mutations[1].kind, MutationKind::Other);
        assert_eq!(
            batch.scopes[0].2,
            Some(SprintWindow::new(1_748_822_400, 1_749_254_399).unwrap())
        );
    }

    #[test]
    fn apply_batch_stores_everything_and_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let batch = parse_batch(Cursor::new(INPUT)).unwrap();

        let first = apply_batch(&mut db, &batch).unwrap();
        assert_eq!(first.mutations_inserted, 2);

        let second = apply_batch(&mut db, &batch).unwrap();
        assert_eq!(second.mutations_read, 2);
        assert_eq!(second.mutations_inserted, 0);

        let scope = ScopeId::new("PHID-PROJ-1").unwrap();
        let tasks = db.tasks_in_scope(&scope).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].monogram, "T1");
    }

    #[test]
    fn parse_batch_rejects_missing_subject() {
        let input = r#"{"type":"mutation","id":"x1","kind":"status","timestamp":1}"#;
        let err = parse_batch(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn parse_batch_rejects_unknown_type() {
        let input = "\n{\"type\":\"comment\",\"id\":\"c1\"}";
        let err = parse_batch(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("invalid JSON on line 2"));
    }

    #[test]
    fn window_on_non_sprint_scope_is_rejected() {
        let input = r#"{"type":"scope","id":"P1","name":"Backend","sprint_start":1,"sprint_end":2}"#;
        let err = parse_batch(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("invalid scope on line 1"));
    }

    #[test]
    fn overlong_window_is_rejected() {
        let input = r#"{"type":"scope","id":"P1","name":"Sprint 1","sprint_start":0,"sprint_end":8000000000000}"#;
        let err = parse_batch(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("invalid scope on line 1"));
        assert!(format!("{err:#}").contains("at most 366 days"));
    }

    #[test]
    fn half_window_is_rejected() {
        let input = r#"{"type":"scope","id":"P1","name":"Sprint 1","sprint_start":1}"#;
        assert!(parse_batch(Cursor::new(input)).is_err());
    }

    #[test]
    fn task_in_unknown_scope_fails() {
        let input = r#"{"type":"task","id":"T1","monogram":"T1","title":"x","status":"open","scopes":["nowhere"]}"#;
        let mut db = Database::open_in_memory().unwrap();
        let batch = parse_batch(Cursor::new(input)).unwrap();

        let err = apply_batch(&mut db, &batch).unwrap_err();
        assert!(err.to_string().contains("unknown scope nowhere"));
    }
}
