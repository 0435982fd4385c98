//! Row types flowing through the pipeline.
//!
//! Raw rows carry every cell as `Option<String>` exactly as ingested.
//! Canonical rows are the deduplicated, fully-resolved tables that KPI
//! engines read. KPI rows are the four result tables.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timezone::Unresolved;

/// Customer row as read from the customers source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCustomer {
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub mobile_number: Option<String>,
    pub region: Option<String>,
}

/// Order line as read from the orders source.
///
/// Several lines may share an `order_id` (one line per item).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOrderLine {
    pub order_id: Option<String>,
    pub mobile_number: Option<String>,
    pub order_date_time: Option<String>,
    pub total_amount: Option<String>,
}

/// Order line after normalization, before timestamp resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub order_id: Option<String>,
    /// Digits only; `None` when absent or no digits remained.
    pub mobile_number: Option<String>,
    pub order_date_time: Option<String>,
    pub total_amount: f64,
}

/// Order line whose local timestamp went through the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrderLine {
    pub order_id: Option<String>,
    pub mobile_number: Option<String>,
    pub order_instant_utc: Result<DateTime<Utc>, Unresolved>,
    pub total_amount: f64,
}

/// One row per distinct mobile number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCustomer {
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub mobile_number: String,
    pub region: String,
}

/// One row per distinct order id.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalOrder {
    pub order_id: String,
    pub mobile_number: String,
    pub order_instant_utc: DateTime<Utc>,
    pub total_amount: f64,
}

/// Both canonical tables of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalDataset {
    pub customers: Vec<CanonicalCustomer>,
    pub orders: Vec<CanonicalOrder>,
}

/// Why a raw row did not make it into a canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingCustomerName,
    MissingMobile,
    MissingOrderId,
    UnresolvableTimestamp,
    DuplicateCustomer,
    DuplicateOrderLine,
}

/// Per-reason counters of excluded rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropTally {
    pub missing_customer_name: usize,
    pub missing_mobile: usize,
    pub missing_order_id: usize,
    pub unresolvable_timestamp: usize,
    pub duplicate_customer: usize,
    pub duplicate_order_line: usize,
}

impl DropTally {
    pub fn record(&mut self, reason: DropReason) {
        *self.slot(reason) += 1;
    }

    pub fn count(&self, reason: DropReason) -> usize {
        match reason {
            DropReason::MissingCustomerName => self.missing_customer_name,
            DropReason::MissingMobile => self.missing_mobile,
            DropReason::MissingOrderId => self.missing_order_id,
            DropReason::UnresolvableTimestamp => self.unresolvable_timestamp,
            DropReason::DuplicateCustomer => self.duplicate_customer,
            DropReason::DuplicateOrderLine => self.duplicate_order_line,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_customer_name
            + self.missing_mobile
            + self.missing_order_id
            + self.unresolvable_timestamp
            + self.duplicate_customer
            + self.duplicate_order_line
    }

    fn slot(&mut self, reason: DropReason) -> &mut usize {
        match reason {
            DropReason::MissingCustomerName => &mut self.missing_customer_name,
            DropReason::MissingMobile => &mut self.missing_mobile,
            DropReason::MissingOrderId => &mut self.missing_order_id,
            DropReason::UnresolvableTimestamp => &mut self.unresolvable_timestamp,
            DropReason::DuplicateCustomer => &mut self.duplicate_customer,
            DropReason::DuplicateOrderLine => &mut self.duplicate_order_line,
        }
    }
}

/// Row counts of one canonicalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub raw_customers: usize,
    pub raw_order_lines: usize,
    pub canonical_customers: usize,
    pub canonical_orders: usize,
    pub dropped: DropTally,
}

/// Customer with more than one canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepeatCustomer {
    pub mobile_number: String,
    pub order_count: u64,
}

/// Order count of one business-timezone calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyOrders {
    pub year: i32,
    pub month: u32,
    pub total_orders: u64,
}

impl MonthlyOrders {
    /// `YYYY-MM` label.
    pub fn year_month(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRevenue {
    pub region: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSpend {
    pub customer_name: String,
    pub total_spent: f64,
}

/// The four KPI result tables, each in its defined order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiReport {
    pub repeat_customers: Vec<RepeatCustomer>,
    pub monthly_trends: Vec<MonthlyOrders>,
    pub regional_revenue: Vec<RegionRevenue>,
    pub top_spenders: Vec<CustomerSpend>,
}

impl KpiReport {
    /// Same rows in the same order, amounts equal within `tolerance`.
    pub fn matches(&self, other: &KpiReport, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;

        self.repeat_customers == other.repeat_customers
            && self.monthly_trends == other.monthly_trends
            && self.regional_revenue.len() == other.regional_revenue.len()
            && self
                .regional_revenue
                .iter()
                .zip(&other.regional_revenue)
                .all(|(a, b)| a.region == b.region && close(a.revenue, b.revenue))
            && self.top_spenders.len() == other.top_spenders.len()
            && self
                .top_spenders
                .iter()
                .zip(&other.top_spenders)
                .all(|(a, b)| a.customer_name == b.customer_name && close(a.total_spent, b.total_spent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_tally_records_per_reason() {
        let mut tally = DropTally::default();
        tally.record(DropReason::MissingMobile);
        tally.record(DropReason::MissingMobile);
        tally.record(DropReason::DuplicateOrderLine);

        assert_eq!(tally.count(DropReason::MissingMobile), 2);
        assert_eq!(tally.count(DropReason::DuplicateOrderLine), 1);
        assert_eq!(tally.count(DropReason::MissingOrderId), 0);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_year_month_label_is_zero_padded() {
        let row = MonthlyOrders {
            year: 2024,
            month: 3,
            total_orders: 7,
        };
        assert_eq!(row.year_month(), "2024-03");
    }

    #[test]
    fn test_report_matches_within_tolerance() {
        let a = KpiReport {
            regional_revenue: vec![RegionRevenue {
                region: "West".to_string(),
                revenue: 100.0,
            }],
            ..Default::default()
        };
        let mut b = a.clone();
        b.regional_revenue[0].revenue = 100.0 + 1e-10;
        assert!(a.matches(&b, 1e-6));

        b.regional_revenue[0].revenue = 101.0;
        assert!(!a.matches(&b, 1e-6));
    }

    #[test]
    fn test_report_mismatch_on_order() {
        let a = KpiReport {
            top_spenders: vec![
                CustomerSpend {
                    customer_name: "Asha".to_string(),
                    total_spent: 10.0,
                },
                CustomerSpend {
                    customer_name: "Ravi".to_string(),
                    total_spent: 5.0,
                },
            ],
            ..Default::default()
        };
        let mut b = a.clone();
        b.top_spenders.reverse();
        assert!(!a.matches(&b, 1e-6));
    }
}
