//! Order KPI - customer/order reconciliation and KPI reporting
//!
//! Turns messy customer and order-line exports into two canonical tables
//! (one row per customer, one row per order, every timestamp resolved to a
//! UTC instant) and computes four KPIs over them, either in memory or pushed
//! down into SQLite. Both execution strategies return the same report.

pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod kpi;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod timezone;
pub mod utils;

pub use error::PipelineError;
pub use kpi::{ExecutionStrategy, KpiEngine, KpiParams};
pub use model::{CanonicalDataset, KpiReport, RunStats};
pub use pipeline::{Pipeline, PipelineOutput};
