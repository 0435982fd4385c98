//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use order_kpi::kpi::{InMemoryKpiEngine, KpiEngine, SqliteKpiEngine};
use order_kpi::model::{RawCustomer, RawOrderLine};
use order_kpi::storage::{connect_sqlite, IN_MEMORY_PATH};
use order_kpi::{KpiParams, Pipeline};

pub fn raw_customer(id: &str, name: &str, mobile: &str, region: &str) -> RawCustomer {
    RawCustomer {
        customer_id: Some(id.to_string()),
        customer_name: Some(name.to_string()),
        mobile_number: Some(mobile.to_string()),
        region: Some(region.to_string()),
    }
}

pub fn raw_line(order_id: &str, mobile: &str, when: &str, amount: &str) -> RawOrderLine {
    RawOrderLine {
        order_id: Some(order_id.to_string()),
        mobile_number: Some(mobile.to_string()),
        order_date_time: Some(when.to_string()),
        total_amount: Some(amount.to_string()),
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn params(zone: Tz, now: DateTime<Utc>) -> KpiParams {
    KpiParams::new(zone, now)
}

pub fn in_memory_engine() -> Arc<dyn KpiEngine> {
    Arc::new(InMemoryKpiEngine::new())
}

pub async fn pushdown_engine() -> Arc<dyn KpiEngine> {
    let pool = connect_sqlite(IN_MEMORY_PATH)
        .await
        .expect("Failed to open in-memory SQLite");
    Arc::new(SqliteKpiEngine::new(pool))
}

/// One pipeline per execution strategy, both reading `source` timestamps.
pub async fn pipelines(source: Tz) -> Vec<Pipeline> {
    vec![
        Pipeline::new(source, in_memory_engine()),
        Pipeline::new(source, pushdown_engine().await),
    ]
}
