//! KPI aggregation.
//!
//! One aggregation contract, [`KpiEngine`], with two interchangeable
//! implementations: [`InMemoryKpiEngine`] computes over the canonical
//! tables in process memory, [`SqliteKpiEngine`] pushes the same relational
//! definitions down into SQLite. Both must return the same rows in the same
//! order for the same canonical input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::info;

use crate::model::{
    CanonicalDataset, CustomerSpend, KpiReport, MonthlyOrders, RegionRevenue, RepeatCustomer,
};
use crate::storage::StorageError;
use crate::timezone;

pub mod memory;
pub mod pushdown;

pub use memory::InMemoryKpiEngine;
pub use pushdown::SqliteKpiEngine;

/// Default length of the top-spenders window.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Errors that can occur during KPI computation.
#[derive(Debug, thiserror::Error)]
pub enum KpiError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No canonical dataset staged")]
    NotStaged,

    #[error("Window must cover at least one day, got {0}")]
    InvalidWindow(i64),
}

pub type Result<T> = std::result::Result<T, KpiError>;

/// Which [`KpiEngine`] implementation a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    #[default]
    InMemory,
    Pushdown,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::InMemory => "in_memory",
            ExecutionStrategy::Pushdown => "pushdown",
        }
    }
}

/// Inputs of the time-dependent KPIs.
///
/// `now` is always passed in, never read from the clock, so a report is a
/// pure function of its canonical input and these parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiParams {
    pub business_timezone: Tz,
    pub now: DateTime<Utc>,
    pub window_days: i64,
    pub horizon_months: Option<u32>,
}

impl KpiParams {
    pub fn new(business_timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            business_timezone,
            now,
            window_days: DEFAULT_WINDOW_DAYS,
            horizon_months: None,
        }
    }

    pub fn with_window_days(mut self, days: i64) -> Result<Self> {
        if days < 1 {
            return Err(KpiError::InvalidWindow(days));
        }
        self.window_days = days;
        Ok(self)
    }

    pub fn with_horizon_months(mut self, months: Option<u32>) -> Self {
        self.horizon_months = months;
        self
    }

    /// Earliest instant counted by the top-spenders window.
    pub fn window_cutoff(&self) -> DateTime<Utc> {
        timezone::trailing_cutoff(self.now, self.business_timezone, self.window_days)
    }

    /// Earliest instant counted by monthly trends, if a horizon is set.
    pub fn horizon_cutoff(&self) -> Option<DateTime<Utc>> {
        self.horizon_months
            .and_then(|months| timezone::horizon_cutoff(self.now, self.business_timezone, months))
    }
}

/// Interface for KPI computation over canonical tables.
///
/// # Implementations
///
/// - `InMemoryKpiEngine`: relational algebra over in-process tables
/// - `SqliteKpiEngine`: SQL pushdown with a precomputed monthly summary
#[async_trait]
pub trait KpiEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Make `dataset` the input of subsequent queries.
    ///
    /// Any precomputed state (e.g. the monthly summary) is rebuilt here.
    async fn stage(&self, dataset: &CanonicalDataset, params: &KpiParams) -> Result<()>;

    /// Customers with more than one order, by count descending then mobile
    /// number ascending.
    async fn repeat_customers(&self, params: &KpiParams) -> Result<Vec<RepeatCustomer>>;

    /// Orders per business-timezone month, ascending by month.
    async fn monthly_trends(&self, params: &KpiParams) -> Result<Vec<MonthlyOrders>>;

    /// Revenue per customer region, unmatched orders under `"Unknown"`, by
    /// revenue descending then region ascending.
    async fn regional_revenue(&self, params: &KpiParams) -> Result<Vec<RegionRevenue>>;

    /// Spend per customer name within the trailing window, unmatched orders
    /// under `"Unknown"`, by spend descending then name ascending.
    async fn top_spenders(&self, params: &KpiParams) -> Result<Vec<CustomerSpend>>;
}

/// Stage `dataset` on `engine` and run all four KPIs.
pub async fn compute_report(
    engine: &dyn KpiEngine,
    dataset: &CanonicalDataset,
    params: &KpiParams,
) -> Result<KpiReport> {
    engine.stage(dataset, params).await?;

    let report = KpiReport {
        repeat_customers: engine.repeat_customers(params).await?,
        monthly_trends: engine.monthly_trends(params).await?,
        regional_revenue: engine.regional_revenue(params).await?,
        top_spenders: engine.top_spenders(params).await?,
    };

    info!(
        engine = engine.name(),
        repeat_customers = report.repeat_customers.len(),
        months = report.monthly_trends.len(),
        regions = report.regional_revenue.len(),
        spenders = report.top_spenders.len(),
        "KPIs computed"
    );

    Ok(report)
}
