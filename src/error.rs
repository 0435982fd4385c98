//! Top-level error type of a pipeline run.
//!
//! Row-level data quality problems are not errors; they are counted in
//! [`RunStats`](crate::model::RunStats). Everything here aborts the run.

use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::kpi::KpiError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Backend failure: {0}")]
    Backend(#[from] StorageError),

    #[error("KPI computation failed: {0}")]
    Kpi(#[from] KpiError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Whether the persistence or execution backend failed, as opposed to
    /// bad input files or settings.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Backend(_) | PipelineError::Kpi(KpiError::Storage(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
