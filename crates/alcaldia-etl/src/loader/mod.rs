//! Loading data types into the database
//!
//! [`DatasetLoader`] is the seam between orchestration and I/O:
//! [`BulkLoader`] only knows how to sequence tasks and collect outcomes,
//! while [`PgDatasetLoader`] does the actual fetching and writing.

pub mod bulk;
pub mod run;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::{LoaderConfig, SourceConfig};
use crate::datasets::{contratos_dacp, modalidades, paa_dacp};
use crate::error::LoadTaskError;
use crate::registry::DataType;
use crate::source::SourceFetcher;

pub use bulk::{plan_tasks, BulkLoader, LoadTask};
pub use run::{LoadRun, TaskOutcome, TaskStatus};

/// Row accounting for one task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Rows present in the source
    pub rows_read: u64,
    /// Rows inserted or changed
    pub rows_written: u64,
    /// Rows rejected as invalid
    pub rows_skipped: u64,
}

/// Loads a single data type.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, data_type: DataType) -> Result<LoadStats, LoadTaskError>;

    /// Where `data_type` reads from, for plans and summaries.
    fn describe_source(&self, data_type: DataType) -> String;
}

/// Loader backed by Postgres
pub struct PgDatasetLoader {
    pool: PgPool,
    fetcher: SourceFetcher,
    sources: SourceConfig,
    batch_size: usize,
}

impl PgDatasetLoader {
    pub fn new(pool: PgPool, fetcher: SourceFetcher, sources: SourceConfig, loader: &LoaderConfig) -> Self {
        Self {
            pool,
            fetcher,
            sources,
            batch_size: loader.batch_size,
        }
    }
}

#[async_trait]
impl DatasetLoader for PgDatasetLoader {
    async fn load(&self, data_type: DataType) -> Result<LoadStats, LoadTaskError> {
        match data_type {
            DataType::Modalidades => modalidades::load(&self.pool).await,
            DataType::PaaDacp => {
                paa_dacp::load(&self.pool, &self.fetcher, &self.sources.paa_dacp, self.batch_size).await
            },
            DataType::ContratosDacp => {
                contratos_dacp::load(&self.pool, &self.fetcher, &self.sources, self.batch_size).await
            },
        }
    }

    fn describe_source(&self, data_type: DataType) -> String {
        self.sources.describe(data_type)
    }
}
