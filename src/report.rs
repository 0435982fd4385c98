//! Rendering of KPI reports.

use std::fmt::Write;

use serde::Serialize;

use crate::model::{KpiReport, RunStats};

fn section(out: &mut String, title: &str, rows: Vec<String>) {
    let _ = writeln!(out, "=== {} ===", title);
    if rows.is_empty() {
        out.push_str("(no rows)\n");
    }
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out.push('\n');
}

/// Plain-text report, one section per KPI.
pub fn render_text(report: &KpiReport) -> String {
    let mut out = String::new();

    section(
        &mut out,
        "Repeat Customers",
        report
            .repeat_customers
            .iter()
            .map(|r| format!("{}\t{}", r.mobile_number, r.order_count))
            .collect(),
    );
    section(
        &mut out,
        "Monthly Order Trends",
        report
            .monthly_trends
            .iter()
            .map(|m| format!("{}\t{}", m.year_month(), m.total_orders))
            .collect(),
    );
    section(
        &mut out,
        "Regional Revenue",
        report
            .regional_revenue
            .iter()
            .map(|r| format!("{}\t{:.2}", r.region, r.revenue))
            .collect(),
    );
    section(
        &mut out,
        "Top Spenders",
        report
            .top_spenders
            .iter()
            .map(|s| format!("{}\t{:.2}", s.customer_name, s.total_spent))
            .collect(),
    );

    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    stats: &'a RunStats,
    #[serde(flatten)]
    report: &'a KpiReport,
}

/// Report and run statistics as one pretty-printed JSON document.
pub fn render_json(report: &KpiReport, stats: &RunStats) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport { stats, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomerSpend, MonthlyOrders, RegionRevenue, RepeatCustomer};

    fn report() -> KpiReport {
        KpiReport {
            repeat_customers: vec![RepeatCustomer {
                mobile_number: "9000000001".to_string(),
                order_count: 3,
            }],
            monthly_trends: vec![MonthlyOrders {
                year: 2024,
                month: 3,
                total_orders: 12,
            }],
            regional_revenue: vec![RegionRevenue {
                region: "North".to_string(),
                revenue: 1234.5,
            }],
            top_spenders: Vec::new(),
        }
    }

    #[test]
    fn test_render_text_sections() {
        let text = render_text(&report());
        assert!(text.contains("=== Repeat Customers ===\n9000000001\t3\n"));
        assert!(text.contains("=== Monthly Order Trends ===\n2024-03\t12\n"));
        assert!(text.contains("=== Regional Revenue ===\nNorth\t1234.50\n"));
        assert!(text.contains("=== Top Spenders ===\n(no rows)\n"));
    }

    #[test]
    fn test_render_json_shape() {
        let json = render_json(&report(), &RunStats::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["repeat_customers"][0]["order_count"], 3);
        assert_eq!(value["monthly_trends"][0]["month"], 3);
        assert_eq!(value["regional_revenue"][0]["revenue"], 1234.5);
        assert_eq!(value["stats"]["dropped"]["missing_mobile"], 0);
        assert!(value["top_spenders"].as_array().unwrap().is_empty());
    }
}
