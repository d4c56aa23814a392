//! Report command for rendering a sprint burndown.
//!
//! This module implements `burndown report <scope>` with human-readable and
//! JSON output. The text report has three sections: the day-by-day data
//! table, the tasks in the sprint, and the events that moved the chart. The
//! JSON report additionally carries the chart series.

use std::fmt::{Display, Write};

use anyhow::Result;
use bd_core::{BurndownEngine, BurndownReport, DateBucket, EventKind, Task};
use bd_db::Database;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use super::util::{display_width, format_points, require_scope, task_names};

/// The time zone and clock a report is rendered for.
#[derive(Debug, Clone)]
pub struct Viewer<Tz: TimeZone> {
    pub tz: Tz,
    /// IANA name of `tz`, for display.
    pub timezone: String,
    pub now: DateTime<Utc>,
}

impl Viewer<Local> {
    /// The local time zone at the current instant.
    pub fn local() -> Self {
        Self {
            tz: Local,
            timezone: iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string()),
            now: Utc::now(),
        }
    }
}

impl<Tz: TimeZone> Viewer<Tz> {
    /// The viewer's current calendar date.
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }
}

/// One row of the events table.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub timestamp: i64,
    /// Local time of the event.
    pub when: String,
    pub subject_id: String,
    pub task: String,
    pub kind: EventKind,
    pub label: String,
}

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    pub today: NaiveDate,
    pub scope_name: String,
    pub report: BurndownReport,
    pub events: Vec<EventRow>,
}

// ========== Report Generation ==========

/// Computes the burndown for `scope` as seen by `viewer`.
pub fn generate_report_data<Tz>(
    db: &Database,
    engine: &BurndownEngine,
    scope: &str,
    viewer: &Viewer<Tz>,
) -> Result<ReportData>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let record = require_scope(db, scope)?;
    let report = engine.report(&record.id, db, db, db, viewer.tz.clone())?;

    let names = task_names(&report.tasks);
    let events = report
        .events
        .iter()
        .map(|event| EventRow {
            timestamp: event.timestamp,
            when: DateTime::from_timestamp(event.timestamp, 0).map_or_else(
                || event.timestamp.to_string(),
                |at| at.with_timezone(&viewer.tz).format("%Y-%m-%d %H:%M").to_string(),
            ),
            subject_id: event.subject_id.to_string(),
            task: names
                .get(&event.subject_id)
                .cloned()
                .unwrap_or_else(|| event.subject_id.to_string()),
            kind: event.kind,
            label: event.label.clone(),
        })
        .collect();

    Ok(ReportData {
        generated_at: viewer.now,
        timezone: viewer.timezone.clone(),
        today: viewer.today(),
        scope_name: record.name,
        report,
        events,
    })
}

// ========== Chart Series ==========

/// One point of the burndown chart.
///
/// The actual series are `None` for sprint days from today onwards, which
/// have not happened yet. The ideal line is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub total_points: Option<f64>,
    pub remaining_points: Option<f64>,
    pub ideal_points: f64,
    pub points_today: Option<f64>,
}

/// Builds the chart series for `buckets` as of `today`.
///
/// The "after" bucket is hidden whenever the last sprint day is.
pub fn chart_series(buckets: &[DateBucket], today: NaiveDate) -> Vec<ChartPoint> {
    let mut future = false;
    buckets
        .iter()
        .map(|bucket| {
            if let Some(date) = bucket.kind.date() {
                future = date >= today;
            }
            let shown = !future;
            ChartPoint {
                date: bucket.label.clone(),
                total_points: shown.then_some(bucket.total_points),
                remaining_points: shown.then_some(bucket.remaining_points),
                ideal_points: bucket.ideal_remaining_points,
                points_today: shown.then_some(bucket.closed_points_today),
            }
        })
        .collect()
}

// ========== Text Output ==========

const DATE_WIDTH: usize = 19;

/// Formats the report for the terminal.
pub fn format_report(data: &ReportData) -> String {
    let mut output = String::new();
    let report = &data.report;

    writeln!(output, "BURNDOWN: {}", data.scope_name).unwrap();
    let mut days = report.buckets.iter().filter(|b| b.kind.date().is_some());
    if let (Some(first), last) = (days.next(), days.last()) {
        let last = last.unwrap_or(first);
        writeln!(
            output,
            "Sprint: {} to {} ({})",
            first.label, last.label, data.timezone
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "DATA").unwrap();
    writeln!(output, "────").unwrap();
    writeln!(
        output,
        "{:<DATE_WIDTH$}  {}  {}  {}  {}  {}  {}",
        "Date",
        "Total Tasks",
        "Remaining Tasks",
        "Total Points",
        "Remaining Points",
        "Ideal Remaining Points",
        "Points Completed Today"
    )
    .unwrap();
    for bucket in &report.buckets {
        writeln!(
            output,
            "{:<DATE_WIDTH$}  {:>11}  {:>15}  {:>12}  {:>16}  {:>22}  {:>22}",
            bucket.label,
            bucket.total_tasks,
            bucket.remaining_tasks,
            format_points(bucket.total_points),
            format_points(bucket.remaining_points),
            format_points(bucket.ideal_remaining_points),
            format_points(bucket.closed_points_today),
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "TASKS").unwrap();
    writeln!(output, "─────").unwrap();
    let names = task_names(&report.tasks);
    let width = names.values().map(|name| display_width(name)).max().unwrap_or(0);
    for task in &report.tasks {
        let name = names.get(&task.id).map_or("", String::as_str);
        writeln!(output, "  {name:<width$}  {}", task.status).unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "EVENTS").unwrap();
    writeln!(output, "──────").unwrap();
    if data.events.is_empty() {
        writeln!(output, "(no events)").unwrap();
    }
    let width = data.events.iter().map(|e| display_width(&e.task)).max().unwrap_or(0);
    for event in &data.events {
        writeln!(
            output,
            "  {}  {:<width$}  {}",
            event.when, event.task, event.label
        )
        .unwrap();
    }

    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    pub timezone: &'a str,
    pub scope: JsonScope<'a>,
    pub window: JsonWindow,
    pub buckets: &'a [DateBucket],
    pub chart: Vec<ChartPoint>,
    pub tasks: &'a [Task],
    pub events: Vec<JsonEvent<'a>>,
}

#[derive(Debug, Serialize)]
pub struct JsonScope<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct JsonWindow {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonEvent<'a> {
    pub timestamp: i64,
    pub subject_id: &'a str,
    pub task: &'a str,
    #[serde(flatten)]
    pub kind: EventKind,
    pub label: &'a str,
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    let report = &data.report;
    let json = JsonReport {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: &data.timezone,
        scope: JsonScope {
            id: report.scope_id.as_str(),
            name: &data.scope_name,
        },
        window: JsonWindow {
            start: report.window.start_utc().map(|dt| dt.to_rfc3339()),
            end: report.window.end_utc().map(|dt| dt.to_rfc3339()),
        },
        buckets: &report.buckets,
        chart: chart_series(&report.buckets, data.today),
        tasks: &report.tasks,
        events: data
            .events
            .iter()
            .map(|e| JsonEvent {
                timestamp: e.timestamp,
                subject_id: &e.subject_id,
                task: &e.task,
                kind: e.kind,
                label: &e.label,
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&json)?)
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run(db: &Database, engine: &BurndownEngine, scope: &str, json: bool) -> Result<()> {
    let data = generate_report_data(db, engine, scope, &Viewer::local())?;

    if json {
        println!("{}", format_report_json(&data)?);
    } else {
        print!("{}", format_report(&data));
    }

    Ok(())
}
