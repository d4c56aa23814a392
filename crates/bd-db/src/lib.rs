//! Storage layer for sprint burndowns.
//!
//! Persists scopes, tasks, scope membership and task mutation history using
//! `rusqlite`, and serves them back to the burndown engine through the
//! collaborator traits from [`bd_core::engine`].
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! Timestamps (`sprint_start`, `sprint_end`, `mutations.timestamp`) are stored
//! as INTEGER epoch seconds.
//!
//! Mutation values are stored as JSON text so that a record reads back exactly
//! as it was imported: `old_value` and `new_value` hold any JSON value, and
//! `metadata` holds a JSON object of string annotations.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use bd_core::{
    MutationKind, MutationLogRepository, MutationRecord, RecordId, ScopeId, SprintWindow,
    SprintWindowProvider, SubjectId, Task, TaskRepository, ValidationError,
};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use thiserror::Error;

/// Subjects per `IN (...)` query when loading mutation history.
pub const SUBJECT_BATCH_SIZE: usize = 500;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored identifier failed validation.
    #[error("invalid stored identifier: {0}")]
    Validation(#[from] ValidationError),
    /// The scope does not exist.
    #[error("unknown scope: {0}")]
    ScopeNotFound(String),
    /// A mutation record could not be stored or read back.
    #[error("invalid mutation record {record_id}: {message}")]
    InvalidRecord { record_id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A scope as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRecord {
    pub id: ScopeId,
    pub name: String,
    pub sprint_start: Option<i64>,
    pub sprint_end: Option<i64>,
}

impl ScopeRecord {
    /// Whether this scope is a sprint: its name mentions "sprint" in any case.
    pub fn is_sprint(&self) -> bool {
        is_sprint_name(&self.name)
    }

    /// The sprint window, if both dates are set and form a valid window.
    pub fn window(&self) -> Option<SprintWindow> {
        let (start, end) = (self.sprint_start?, self.sprint_end?);
        SprintWindow::new(start, end).ok()
    }
}

/// Returns true if a scope with this name is treated as a sprint.
pub fn is_sprint_name(name: &str) -> bool {
    name.to_lowercase().contains("sprint")
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scopes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sprint_start INTEGER,
                sprint_end INTEGER
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                owner TEXT,
                monogram TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_scopes (
                task_id TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                PRIMARY KEY (task_id, scope_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_task_scopes_scope ON task_scopes(scope_id);

            -- Mutations table: append-only task history
            -- kind: mutation kind (e.g., 'status_change')
            -- old_value, new_value: JSON values
            -- metadata: JSON object of string annotations
            CREATE TABLE IF NOT EXISTS mutations (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                old_value TEXT NOT NULL,
                new_value TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_mutations_subject ON mutations(subject_id, timestamp);
            ",
        )?;
        Ok(())
    }

    /// Creates a scope or renames an existing one. The sprint window is kept.
    pub fn upsert_scope(&mut self, id: &ScopeId, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO scopes (id, name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            ",
            params![id.as_str(), name],
        )?;
        Ok(())
    }

    /// Sets the sprint start and end dates of a scope.
    pub fn set_sprint_window(&mut self, id: &ScopeId, window: SprintWindow) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE scopes SET sprint_start = ?, sprint_end = ? WHERE id = ?",
            params![window.start, window.end, id.as_str()],
        )?;
        if updated == 0 {
            return Err(DbError::ScopeNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Looks up a scope by ID.
    pub fn get_scope(&self, id: &ScopeId) -> Result<Option<ScopeRecord>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, sprint_start, sprint_end FROM scopes WHERE id = ?",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(scope_from_row).transpose()
    }

    /// Lists scopes ordered by name then ID.
    pub fn list_scopes(&self) -> Result<Vec<ScopeRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, sprint_start, sprint_end
            FROM scopes
            ORDER BY name ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;
        let mut scopes = Vec::new();
        for row in rows {
            scopes.push(scope_from_row(row?)?);
        }
        Ok(scopes)
    }

    /// Lists the scopes that are sprints.
    pub fn list_sprints(&self) -> Result<Vec<ScopeRecord>, DbError> {
        let mut scopes = self.list_scopes()?;
        scopes.retain(ScopeRecord::is_sprint);
        Ok(scopes)
    }

    /// Creates or updates a task.
    pub fn upsert_task(&mut self, task: &Task) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO tasks (id, title, status, owner, monogram) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                owner = excluded.owner,
                monogram = excluded.monogram
            ",
            params![
                task.id.as_str(),
                task.title,
                task.status,
                task.owner,
                task.monogram
            ],
        )?;
        Ok(())
    }

    /// Makes a task a member of a scope, ignoring duplicates.
    ///
    /// Both the task and the scope must already exist.
    pub fn add_task_to_scope(&mut self, task: &SubjectId, scope: &ScopeId) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO task_scopes (task_id, scope_id) VALUES (?, ?)",
            params![task.as_str(), scope.as_str()],
        )?;
        Ok(())
    }

    /// Inserts a batch of mutation records, ignoring duplicates by ID.
    ///
    /// Returns the number of records actually inserted. Records without a
    /// subject are rejected and nothing from the batch is stored.
    pub fn insert_mutations(&mut self, records: &[MutationRecord]) -> Result<usize, DbError> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO mutations
                (id, subject_id, kind, old_value, new_value, timestamp, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for record in records {
                let subject = record.subject_id.as_ref().ok_or_else(|| DbError::InvalidRecord {
                    record_id: record.id.to_string(),
                    message: "missing subject".to_string(),
                })?;
                let metadata = serde_json::to_string(&record.metadata).map_err(|e| {
                    DbError::InvalidRecord {
                        record_id: record.id.to_string(),
                        message: e.to_string(),
                    }
                })?;
                inserted += stmt.execute(params![
                    record.id.as_str(),
                    subject.as_str(),
                    record.kind.as_str(),
                    record.old_value.to_string(),
                    record.new_value.to_string(),
                    record.timestamp,
                    metadata,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(records = records.len(), inserted, "stored mutation records");
        Ok(inserted)
    }

    /// Lists the tasks in a scope ordered by monogram then ID.
    pub fn list_tasks_in_scope(&self, scope: &ScopeId) -> Result<Vec<Task>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT t.id, t.title, t.status, t.owner, t.monogram
            FROM tasks t
            JOIN task_scopes ts ON ts.task_id = t.id
            WHERE ts.scope_id = ?
            ORDER BY t.monogram ASC, t.id ASC
            ",
        )?;
        let rows = stmt.query_map([scope.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut tasks = Vec::new();
        for row in rows {
            let (id, title, status, owner, monogram) = row?;
            tasks.push(Task {
                id: SubjectId::new(id)?,
                monogram,
                title,
                status,
                owner,
            });
        }
        Ok(tasks)
    }

    /// Lists the mutation history of the given tasks.
    ///
    /// Rows are ordered by timestamp, then by insertion order, so records that
    /// share a second read back in the order they were imported. Subjects are
    /// queried in batches of [`SUBJECT_BATCH_SIZE`] to stay under SQLite's
    /// bound parameter limit.
    pub fn list_mutations(&self, subjects: &[SubjectId]) -> Result<Vec<MutationRecord>, DbError> {
        let mut seen = HashSet::new();
        let subjects: Vec<&str> = subjects
            .iter()
            .map(SubjectId::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut rows = Vec::new();
        for batch in subjects.chunks(SUBJECT_BATCH_SIZE) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let query = format!(
                "
                SELECT rowid, id, subject_id, kind, old_value, new_value, timestamp, metadata
                FROM mutations
                WHERE subject_id IN ({placeholders})
                "
            );
            let mut stmt = self.conn.prepare(&query)?;
            let batch_rows = stmt.query_map(params_from_iter(batch), |row| {
                Ok(MutationRow {
                    rowid: row.get(0)?,
                    id: row.get(1)?,
                    subject_id: row.get(2)?,
                    kind: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    timestamp: row.get(6)?,
                    metadata: row.get(7)?,
                })
            })?;
            for row in batch_rows {
                rows.push(row?);
            }
        }

        rows.sort_by_key(|row| (row.timestamp, row.rowid));
        tracing::debug!(
            subjects = subjects.len(),
            batches = subjects.len().div_ceil(SUBJECT_BATCH_SIZE),
            records = rows.len(),
            "loaded mutation records"
        );
        rows.into_iter().map(MutationRow::into_record).collect()
    }
}

/// A raw row from the mutations table.
struct MutationRow {
    rowid: i64,
    id: String,
    subject_id: String,
    kind: String,
    old_value: String,
    new_value: String,
    timestamp: i64,
    metadata: String,
}

impl MutationRow {
    fn into_record(self) -> Result<MutationRecord, DbError> {
        let invalid = |e: serde_json::Error| DbError::InvalidRecord {
            record_id: self.id.clone(),
            message: e.to_string(),
        };
        let old_value = serde_json::from_str(&self.old_value).map_err(invalid)?;
        let new_value = serde_json::from_str(&self.new_value).map_err(invalid)?;
        let metadata: BTreeMap<String, String> =
            serde_json::from_str(&self.metadata).map_err(invalid)?;
        let Ok(kind) = self.kind.parse::<MutationKind>();

        Ok(MutationRecord {
            id: RecordId::new(self.id.clone())?,
            subject_id: Some(SubjectId::new(self.subject_id.clone())?),
            kind,
            old_value,
            new_value,
            timestamp: self.timestamp,
            metadata,
        })
    }
}

fn scope_from_row(
    (id, name, sprint_start, sprint_end): (String, String, Option<i64>, Option<i64>),
) -> Result<ScopeRecord, DbError> {
    Ok(ScopeRecord {
        id: ScopeId::new(id)?,
        name,
        sprint_start,
        sprint_end,
    })
}

impl TaskRepository for Database {
    type Error = DbError;

    fn tasks_in_scope(&self, scope: &ScopeId) -> Result<Vec<Task>, Self::Error> {
        self.list_tasks_in_scope(scope)
    }
}

impl MutationLogRepository for Database {
    type Error = DbError;

    fn for_subjects(&self, subjects: &[SubjectId]) -> Result<Vec<MutationRecord>, Self::Error> {
        self.list_mutations(subjects)
    }
}

impl SprintWindowProvider for Database {
    type Error = DbError;

    fn window_for(&self, scope: &ScopeId) -> Result<Option<SprintWindow>, Self::Error> {
        Ok(self.get_scope(scope)?.and_then(|s| s.window()))
    }
}
