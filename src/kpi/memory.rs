//! In-memory KPI engine.
//!
//! Each KPI is a plain function over the canonical tables; the engine only
//! holds the staged dataset.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KpiEngine, KpiError, KpiParams, Result};
use crate::model::{
    CanonicalCustomer, CanonicalDataset, CanonicalOrder, CustomerSpend, MonthlyOrders,
    RegionRevenue, RepeatCustomer,
};
use crate::normalize::UNKNOWN;
use crate::timezone::business_month;

/// Count orders per mobile number and keep numbers with more than one.
pub fn repeat_customers(orders: &[CanonicalOrder]) -> Vec<RepeatCustomer> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for order in orders {
        *counts.entry(order.mobile_number.as_str()).or_default() += 1;
    }

    let mut rows: Vec<_> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(mobile_number, order_count)| RepeatCustomer {
            mobile_number: mobile_number.to_string(),
            order_count,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.order_count
            .cmp(&a.order_count)
            .then_with(|| a.mobile_number.cmp(&b.mobile_number))
    });
    rows
}

/// Count orders per business-timezone calendar month.
pub fn monthly_trends(orders: &[CanonicalOrder], params: &KpiParams) -> Vec<MonthlyOrders> {
    let horizon = params.horizon_cutoff();
    let mut counts: BTreeMap<(i32, u32), u64> = BTreeMap::new();

    for order in orders {
        if horizon.is_some_and(|cutoff| order.order_instant_utc < cutoff) {
            continue;
        }
        *counts
            .entry(business_month(order.order_instant_utc, params.business_timezone))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((year, month), total_orders)| MonthlyOrders {
            year,
            month,
            total_orders,
        })
        .collect()
}

fn customers_by_mobile(customers: &[CanonicalCustomer]) -> HashMap<&str, &CanonicalCustomer> {
    customers
        .iter()
        .map(|c| (c.mobile_number.as_str(), c))
        .collect()
}

/// Sum amounts per key, then order by sum descending and key ascending.
fn ranked_sums<'a, I>(pairs: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for (key, amount) in pairs {
        *sums.entry(key).or_default() += amount;
    }

    let mut rows: Vec<_> = sums
        .into_iter()
        .map(|(key, sum)| (key.to_string(), sum))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Revenue per region over a left join of orders to customers.
pub fn regional_revenue(dataset: &CanonicalDataset) -> Vec<RegionRevenue> {
    let customers = customers_by_mobile(&dataset.customers);

    ranked_sums(dataset.orders.iter().map(|order| {
        let region = customers
            .get(order.mobile_number.as_str())
            .map(|c| c.region.as_str())
            .unwrap_or(UNKNOWN);
        (region, order.total_amount)
    }))
    .into_iter()
    .map(|(region, revenue)| RegionRevenue { region, revenue })
    .collect()
}

/// Spend per customer name for orders inside the trailing window.
pub fn top_spenders(dataset: &CanonicalDataset, params: &KpiParams) -> Vec<CustomerSpend> {
    let cutoff = params.window_cutoff();
    let customers = customers_by_mobile(&dataset.customers);

    ranked_sums(
        dataset
            .orders
            .iter()
            .filter(|order| order.order_instant_utc >= cutoff)
            .map(|order| {
                let name = customers
                    .get(order.mobile_number.as_str())
                    .map(|c| c.customer_name.as_str())
                    .unwrap_or(UNKNOWN);
                (name, order.total_amount)
            }),
    )
    .into_iter()
    .map(|(customer_name, total_spent)| CustomerSpend {
        customer_name,
        total_spent,
    })
    .collect()
}

/// KPI engine over in-process canonical tables.
#[derive(Default)]
pub struct InMemoryKpiEngine {
    staged: RwLock<Option<Arc<CanonicalDataset>>>,
}

impl InMemoryKpiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn dataset(&self) -> Result<Arc<CanonicalDataset>> {
        self.staged.read().await.clone().ok_or(KpiError::NotStaged)
    }
}

#[async_trait]
impl KpiEngine for InMemoryKpiEngine {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn stage(&self, dataset: &CanonicalDataset, _params: &KpiParams) -> Result<()> {
        *self.staged.write().await = Some(Arc::new(dataset.clone()));
        Ok(())
    }

    async fn repeat_customers(&self, _params: &KpiParams) -> Result<Vec<RepeatCustomer>> {
        Ok(repeat_customers(&self.dataset().await?.orders))
    }

    async fn monthly_trends(&self, params: &KpiParams) -> Result<Vec<MonthlyOrders>> {
        Ok(monthly_trends(&self.dataset().await?.orders, params))
    }

    async fn regional_revenue(&self, _params: &KpiParams) -> Result<Vec<RegionRevenue>> {
        Ok(regional_revenue(&*self.dataset().await?))
    }

    async fn top_spenders(&self, params: &KpiParams) -> Result<Vec<CustomerSpend>> {
        Ok(top_spenders(&*self.dataset().await?, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn order(id: &str, mobile: &str, instant: DateTime<Utc>, amount: f64) -> CanonicalOrder {
        CanonicalOrder {
            order_id: id.to_string(),
            mobile_number: mobile.to_string(),
            order_instant_utc: instant,
            total_amount: amount,
        }
    }

    fn customer(name: &str, mobile: &str, region: &str) -> CanonicalCustomer {
        CanonicalCustomer {
            customer_id: None,
            customer_name: name.to_string(),
            mobile_number: mobile.to_string(),
            region: region.to_string(),
        }
    }

    fn params() -> KpiParams {
        KpiParams::new(chrono_tz::Asia::Kolkata, at(2024, 6, 30, 12))
    }

    #[test]
    fn test_repeat_customers_only_counts_above_one() {
        let orders = vec![
            order("O1", "111", at(2024, 1, 1, 0), 1.0),
            order("O2", "111", at(2024, 1, 2, 0), 1.0),
            order("O3", "111", at(2024, 1, 3, 0), 1.0),
            order("O4", "222", at(2024, 1, 4, 0), 1.0),
        ];

        assert_eq!(
            repeat_customers(&orders),
            vec![RepeatCustomer {
                mobile_number: "111".to_string(),
                order_count: 3,
            }]
        );
    }

    #[test]
    fn test_repeat_customers_ties_by_mobile_ascending() {
        let orders = vec![
            order("O1", "333", at(2024, 1, 1, 0), 1.0),
            order("O2", "333", at(2024, 1, 1, 0), 1.0),
            order("O3", "111", at(2024, 1, 1, 0), 1.0),
            order("O4", "111", at(2024, 1, 1, 0), 1.0),
        ];

        let mobiles: Vec<_> = repeat_customers(&orders)
            .into_iter()
            .map(|r| r.mobile_number)
            .collect();
        assert_eq!(mobiles, vec!["111", "333"]);
    }

    #[test]
    fn test_monthly_trends_buckets_in_business_timezone() {
        let orders = vec![
            // 2024-02-01 01:30 IST
            order("O1", "1", at(2024, 1, 31, 20), 1.0),
            order("O2", "1", at(2024, 1, 15, 0), 1.0),
            order("O3", "1", at(2024, 1, 16, 0), 1.0),
        ];

        let rows = monthly_trends(&orders, &params());
        assert_eq!(
            rows,
            vec![
                MonthlyOrders {
                    year: 2024,
                    month: 1,
                    total_orders: 2,
                },
                MonthlyOrders {
                    year: 2024,
                    month: 2,
                    total_orders: 1,
                },
            ]
        );
    }

    #[test]
    fn test_monthly_trends_respects_horizon() {
        let orders = vec![
            order("O1", "1", at(2023, 12, 1, 0), 1.0),
            order("O2", "1", at(2024, 5, 15, 0), 1.0),
        ];
        let params = params().with_horizon_months(Some(3));

        let rows = monthly_trends(&orders, &params);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year_month(), "2024-05");
    }

    #[test]
    fn test_regional_revenue_left_join_defaults_unknown() {
        let dataset = CanonicalDataset {
            customers: vec![customer("Asha", "111", "North")],
            orders: vec![
                order("O1", "111", at(2024, 1, 1, 0), 100.0),
                order("O2", "9999999999", at(2024, 1, 1, 0), 500.0),
            ],
        };

        assert_eq!(
            regional_revenue(&dataset),
            vec![
                RegionRevenue {
                    region: "Unknown".to_string(),
                    revenue: 500.0,
                },
                RegionRevenue {
                    region: "North".to_string(),
                    revenue: 100.0,
                },
            ]
        );
    }

    #[test]
    fn test_regional_revenue_merges_unknown_region_and_unmatched() {
        let dataset = CanonicalDataset {
            customers: vec![customer("Asha", "111", UNKNOWN)],
            orders: vec![
                order("O1", "111", at(2024, 1, 1, 0), 100.0),
                order("O2", "222", at(2024, 1, 1, 0), 50.0),
            ],
        };

        let rows = regional_revenue(&dataset);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].revenue, 150.0);
    }

    #[test]
    fn test_top_spenders_filters_window() {
        let dataset = CanonicalDataset {
            customers: vec![customer("Asha", "111", "North"), customer("Ravi", "222", "South")],
            orders: vec![
                order("O1", "111", at(2024, 6, 29, 0), 100.0),
                order("O2", "111", at(2024, 6, 20, 0), 50.0),
                order("O3", "222", at(2024, 6, 25, 0), 300.0),
                order("O4", "333", at(2024, 6, 26, 0), 10.0),
                order("O5", "222", at(2024, 4, 1, 0), 9999.0),
            ],
        };

        assert_eq!(
            top_spenders(&dataset, &params()),
            vec![
                CustomerSpend {
                    customer_name: "Ravi".to_string(),
                    total_spent: 300.0,
                },
                CustomerSpend {
                    customer_name: "Asha".to_string(),
                    total_spent: 150.0,
                },
                CustomerSpend {
                    customer_name: "Unknown".to_string(),
                    total_spent: 10.0,
                },
            ]
        );
    }

    #[test]
    fn test_top_spenders_cutoff_is_inclusive() {
        let params = params();
        let dataset = CanonicalDataset {
            customers: Vec::new(),
            orders: vec![order("O1", "1", params.window_cutoff(), 5.0)],
        };
        assert_eq!(top_spenders(&dataset, &params).len(), 1);
    }

    #[tokio::test]
    async fn test_engine_requires_staging() {
        let engine = InMemoryKpiEngine::new();
        let result = engine.repeat_customers(&params()).await;
        assert!(matches!(result, Err(KpiError::NotStaged)));
    }

    #[tokio::test]
    async fn test_engine_uses_latest_staged_dataset() {
        let engine = InMemoryKpiEngine::new();
        let first = CanonicalDataset {
            customers: Vec::new(),
            orders: vec![
                order("O1", "1", at(2024, 1, 1, 0), 1.0),
                order("O2", "1", at(2024, 1, 2, 0), 1.0),
            ],
        };
        engine.stage(&first, &params()).await.unwrap();
        assert_eq!(engine.repeat_customers(&params()).await.unwrap().len(), 1);

        engine.stage(&CanonicalDataset::default(), &params()).await.unwrap();
        assert!(engine.repeat_customers(&params()).await.unwrap().is_empty());
    }
}
