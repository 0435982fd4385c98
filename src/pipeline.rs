//! End-to-end run: normalize, resolve, deduplicate, persist, aggregate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::info;

use crate::config::{Config, PipelineConfig, StorageType};
use crate::dedup::{dedup_customers, dedup_orders};
use crate::error::Result;
use crate::kpi::{
    compute_report, ExecutionStrategy, InMemoryKpiEngine, KpiEngine, KpiParams, SqliteKpiEngine,
};
use crate::model::{CanonicalDataset, DropTally, KpiReport, RawCustomer, RawOrderLine, RunStats};
use crate::normalize::{mask_mobile, normalize_customers, normalize_order_lines};
use crate::storage::{connect_sqlite, CanonicalStore, SqliteCanonicalStore};
use crate::timezone::TimezoneResolver;

/// Number of repeat customers logged after a run.
const SAMPLE_SIZE: usize = 3;

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: CanonicalDataset,
    pub report: KpiReport,
    pub stats: RunStats,
}

/// A configured pipeline.
///
/// Canonicalization is pure; the optional store and the engine are the only
/// collaborators that touch a backend.
pub struct Pipeline {
    resolver: TimezoneResolver,
    engine: Arc<dyn KpiEngine>,
    store: Option<Arc<dyn CanonicalStore>>,
}

impl Pipeline {
    pub fn new(source_timezone: Tz, engine: Arc<dyn KpiEngine>) -> Self {
        Self {
            resolver: TimezoneResolver::new(source_timezone),
            engine,
            store: None,
        }
    }

    /// Persist canonical tables through `store` before aggregation.
    pub fn with_store(mut self, store: Arc<dyn CanonicalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build a pipeline from validated configuration.
    ///
    /// The pushdown engine persists the canonical tables itself while
    /// staging, so no separate store is attached in that case.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source_timezone = config.pipeline.source_zone()?;

        let pipeline = match (config.execution.strategy, config.storage.storage_type) {
            (ExecutionStrategy::Pushdown, _) => {
                let pool = connect_sqlite(&config.storage.sqlite.path).await?;
                Self::new(source_timezone, Arc::new(SqliteKpiEngine::new(pool)))
            }
            (ExecutionStrategy::InMemory, StorageType::Sqlite) => {
                let pool = connect_sqlite(&config.storage.sqlite.path).await?;
                Self::new(source_timezone, Arc::new(InMemoryKpiEngine::new()))
                    .with_store(Arc::new(SqliteCanonicalStore::new(pool)))
            }
            (ExecutionStrategy::InMemory, StorageType::None) => {
                Self::new(source_timezone, Arc::new(InMemoryKpiEngine::new()))
            }
        };

        info!(
            strategy = config.execution.strategy.as_str(),
            source_timezone = %source_timezone,
            "Pipeline configured"
        );
        Ok(pipeline)
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Turn raw rows into the two canonical tables.
    pub fn canonicalize(
        &self,
        customers: Vec<RawCustomer>,
        order_lines: Vec<RawOrderLine>,
    ) -> (CanonicalDataset, RunStats) {
        let raw_customers = customers.len();
        let raw_order_lines = order_lines.len();
        let mut dropped = DropTally::default();

        let customers = normalize_customers(customers, &mut dropped);
        let customers = dedup_customers(customers, &mut dropped);

        let lines = normalize_order_lines(order_lines);
        let lines = self.resolver.resolve_lines(lines);
        let orders = dedup_orders(lines, &mut dropped);

        let stats = RunStats {
            raw_customers,
            raw_order_lines,
            canonical_customers: customers.len(),
            canonical_orders: orders.len(),
            dropped,
        };

        info!(
            raw_customers,
            raw_order_lines,
            canonical_customers = stats.canonical_customers,
            canonical_orders = stats.canonical_orders,
            dropped = dropped.total(),
            unresolved_timestamps = dropped.unresolvable_timestamp,
            "Canonical tables built"
        );

        (CanonicalDataset { customers, orders }, stats)
    }

    /// Run the whole pipeline on raw rows.
    ///
    /// A store or engine failure aborts the run with no partial report.
    pub async fn run(
        &self,
        customers: Vec<RawCustomer>,
        order_lines: Vec<RawOrderLine>,
        params: &KpiParams,
    ) -> Result<PipelineOutput> {
        let (dataset, stats) = self.canonicalize(customers, order_lines);

        if let Some(store) = &self.store {
            store.replace(&dataset).await?;
            info!("Canonical tables persisted");
        }

        let report = compute_report(self.engine.as_ref(), &dataset, params).await?;

        for sample in report.repeat_customers.iter().take(SAMPLE_SIZE) {
            info!(
                mobile = %mask_mobile(&sample.mobile_number),
                orders = sample.order_count,
                "Repeat customer"
            );
        }

        Ok(PipelineOutput {
            dataset,
            report,
            stats,
        })
    }
}

/// KPI parameters from pipeline settings and an injected `now`.
pub fn kpi_params(config: &PipelineConfig, now: DateTime<Utc>) -> Result<KpiParams> {
    Ok(KpiParams::new(config.business_zone()?, now)
        .with_window_days(config.window_days)?
        .with_horizon_months(config.horizon_months))
}
