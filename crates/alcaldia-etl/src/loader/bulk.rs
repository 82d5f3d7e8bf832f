//! Sequential bulk loading
//!
//! A selection is resolved against the registry into an ordered list of
//! [`LoadTask`]s. Tasks run one at a time; a failing task is recorded and
//! the next one still runs.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};

use super::run::{LoadRun, TaskOutcome, TaskStatus};
use super::DatasetLoader;
use crate::error::{LoadTaskError, UnknownDataTypeError};
use crate::registry::{DataType, Selection, ALL_SELECTOR};

/// One data type to load in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadTask {
    pub data_type: DataType,
    pub table: &'static str,
    pub source: String,
}

/// Resolve `selection` against `registry` without touching any source.
///
/// `all` expands to the whole registry in its declared order; a single
/// data type must be part of the registry.
pub fn plan_tasks(
    registry: &[DataType],
    selection: &Selection,
    describe_source: impl Fn(DataType) -> String,
) -> Result<Vec<LoadTask>, UnknownDataTypeError> {
    let selected: Vec<DataType> = match selection {
        Selection::All => registry.to_vec(),
        Selection::Only(data_type) if registry.contains(data_type) => vec![*data_type],
        Selection::Only(data_type) => {
            return Err(UnknownDataTypeError {
                requested: data_type.to_string(),
                valid: registry
                    .iter()
                    .map(|dt| dt.to_string())
                    .chain(std::iter::once(ALL_SELECTOR.to_string()))
                    .collect(),
            });
        },
    };

    Ok(selected
        .into_iter()
        .map(|data_type| LoadTask {
            data_type,
            table: data_type.table(),
            source: describe_source(data_type),
        })
        .collect())
}

pub struct BulkLoader<L> {
    loader: L,
    registry: Vec<DataType>,
    task_timeout: Option<Duration>,
}

impl<L: DatasetLoader> BulkLoader<L> {
    /// Loader over every registered data type.
    pub fn new(loader: L) -> Self {
        Self::with_registry(loader, DataType::ALL.to_vec())
    }

    /// Loader over an explicit, already ordered set of data types.
    pub fn with_registry(loader: L, registry: Vec<DataType>) -> Self {
        Self {
            loader,
            registry,
            task_timeout: None,
        }
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Resolve `selection` into tasks, in registry order.
    pub fn plan(&self, selection: &Selection) -> Result<Vec<LoadTask>, UnknownDataTypeError> {
        plan_tasks(&self.registry, selection, |data_type| self.loader.describe_source(data_type))
    }

    /// Run every task of `selection` and collect the outcomes.
    pub async fn run(&self, selection: &Selection) -> Result<LoadRun, UnknownDataTypeError> {
        let tasks = self.plan(selection)?;
        let started_at = Utc::now();

        info!(selection = %selection, tasks = tasks.len(), "Starting load run");

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let span = info_span!("load_task", data_type = %task.data_type, table = task.table);
            outcomes.push(self.run_task(task).instrument(span).await);
        }

        let run = LoadRun {
            selection: *selection,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            succeeded = run.succeeded().count(),
            failed = run.failed().count(),
            "Load run completed"
        );

        Ok(run)
    }

    async fn run_task(&self, task: LoadTask) -> TaskOutcome {
        info!(source = %task.source, "Loading");
        let start = Instant::now();

        let result = match self.task_timeout {
            Some(limit) => tokio::time::timeout(limit, self.loader.load(task.data_type))
                .await
                .unwrap_or_else(|_| {
                    Err(LoadTaskError::Timeout {
                        secs: limit.as_secs(),
                    })
                }),
            None => self.loader.load(task.data_type).await,
        };
        let duration = start.elapsed();

        let status = match result {
            Ok(stats) => {
                info!(
                    read = stats.rows_read,
                    written = stats.rows_written,
                    skipped = stats.rows_skipped,
                    duration_ms = duration.as_millis() as u64,
                    "✓ Loaded"
                );
                TaskStatus::Succeeded(stats)
            },
            Err(e) => {
                error!(error = %e, duration_ms = duration.as_millis() as u64, "✗ Load failed");
                TaskStatus::Failed(e)
            },
        };

        TaskOutcome {
            task,
            status,
            duration,
        }
    }
}
