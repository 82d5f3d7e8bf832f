//! Results of one load run and their rendering

use std::time::Duration;

use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use super::bulk::LoadTask;
use super::LoadStats;
use crate::error::LoadTaskError;
use crate::registry::Selection;

#[derive(Debug)]
pub enum TaskStatus {
    Succeeded(LoadStats),
    Failed(LoadTaskError),
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub task: LoadTask,
    pub status: TaskStatus,
    pub duration: Duration,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded(_))
    }
}

/// Everything one invocation did
#[derive(Debug)]
pub struct LoadRun {
    pub selection: Selection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
}

/// Flat, serializable view of a [`TaskOutcome`]
#[derive(Debug, Serialize)]
struct TaskSummary<'a> {
    data_type: &'a str,
    table: &'a str,
    source: &'a str,
    status: &'static str,
    #[serde(flatten)]
    stats: Option<LoadStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    selection: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    succeeded: usize,
    failed: usize,
    tasks: Vec<TaskSummary<'a>>,
}

impl LoadRun {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_success())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            selection: self.selection.to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            succeeded: self.succeeded().count(),
            failed: self.failed().count(),
            tasks: self
                .outcomes
                .iter()
                .map(|outcome| {
                    let (status, stats, error) = match &outcome.status {
                        TaskStatus::Succeeded(stats) => ("succeeded", Some(*stats), None),
                        TaskStatus::Failed(e) => ("failed", None, Some(e.to_string())),
                    };
                    TaskSummary {
                        data_type: outcome.task.data_type.as_str(),
                        table: outcome.task.table,
                        source: &outcome.task.source,
                        status,
                        stats,
                        error,
                        duration_ms: outcome.duration.as_millis() as u64,
                    }
                })
                .collect(),
        }
    }

    /// Human-readable summary table, followed by a totals line.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "Data type", "Table", "Status", "Read", "Written", "Skipped", "Duration", "Error",
            ]);

        for outcome in &self.outcomes {
            let duration = format!("{:.2}s", outcome.duration.as_secs_f64());
            let row = match &outcome.status {
                TaskStatus::Succeeded(stats) => vec![
                    outcome.task.data_type.to_string(),
                    outcome.task.table.to_string(),
                    "✓ ok".to_string(),
                    stats.rows_read.to_string(),
                    stats.rows_written.to_string(),
                    stats.rows_skipped.to_string(),
                    duration,
                    String::new(),
                ],
                TaskStatus::Failed(e) => vec![
                    outcome.task.data_type.to_string(),
                    outcome.task.table.to_string(),
                    "✗ failed".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    duration,
                    e.to_string(),
                ],
            };
            table.add_row(row);
        }

        let failed: Vec<&str> = self.failed().map(|o| o.task.data_type.as_str()).collect();
        let totals = if failed.is_empty() {
            format!("{} task(s) succeeded", self.outcomes.len())
        } else {
            format!(
                "{} task(s) succeeded, {} failed: {}",
                self.outcomes.len() - failed.len(),
                failed.len(),
                failed.join(", ")
            )
        };

        format!("{}\n{}", table, totals)
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.summary())
    }
}
