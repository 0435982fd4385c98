//! SQL pushdown KPI engine.
//!
//! Stages the canonical tables into SQLite and expresses every KPI as one
//! query. Monthly trends read a precomputed `orders_monthly` summary that is
//! rebuilt inside a single transaction on every stage.
//!
//! SQLite has no IANA timezone support, so business-timezone months are
//! bucketed against a temp `month_bounds` table of UTC ranges computed here.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use sea_query::{Alias, Expr, Func, Order, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{KpiEngine, KpiError, KpiParams, Result};
use crate::model::{CanonicalDataset, CustomerSpend, MonthlyOrders, RegionRevenue, RepeatCustomer};
use crate::normalize::UNKNOWN;
use crate::storage::schema::{
    Customers, MonthBounds, Orders, OrdersMonthly, CREATE_MONTH_BOUNDS_TABLE,
    CREATE_ORDERS_MONTHLY_TABLE,
};
use crate::storage::{self, CanonicalStore, SqliteCanonicalStore, StorageError};
use crate::timezone::{business_month, month_start_utc, next_month};

/// KPI engine that pushes aggregation down into SQLite.
pub struct SqliteKpiEngine {
    pool: SqlitePool,
    store: SqliteCanonicalStore,
    staged: AtomicBool,
}

impl SqliteKpiEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            store: SqliteCanonicalStore::new(pool.clone()),
            pool,
            staged: AtomicBool::new(false),
        }
    }

    fn ensure_staged(&self) -> Result<()> {
        if self.staged.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(KpiError::NotStaged)
        }
    }

    /// Rebuild `orders_monthly` from the staged orders.
    ///
    /// Readers see either the previous summary or the new one.
    async fn refresh_monthly_summary(&self, params: &KpiParams) -> storage::Result<u64> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(CREATE_ORDERS_MONTHLY_TABLE)
            .execute(&mut *conn)
            .await?;
        sqlx::query(CREATE_MONTH_BOUNDS_TABLE)
            .execute(&mut *conn)
            .await?;

        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::rebuild_summary(&mut conn, params).await;

        match result {
            Ok(months) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(e.into());
                }
                debug!(months, "Monthly summary refreshed");
                Ok(months)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn rebuild_summary(conn: &mut SqliteConnection, params: &KpiParams) -> storage::Result<u64> {
        let horizon_us = params.horizon_cutoff().map(|c| c.timestamp_micros());

        let clear_bounds = Query::delete()
            .from_table(MonthBounds::Table)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&clear_bounds).execute(&mut *conn).await?;

        let row = sqlx::query(&Self::instant_range_sql(horizon_us))
            .fetch_one(&mut *conn)
            .await?;
        let lo: Option<i64> = row.try_get("lo")?;
        let hi: Option<i64> = row.try_get("hi")?;

        if let (Some(lo), Some(hi)) = (lo, hi) {
            let bounds = month_bounds(params.business_timezone, lo, hi)?;
            sqlx::query(&Self::month_bounds_insert_sql(&bounds))
                .execute(&mut *conn)
                .await?;
        }

        let clear_summary = Query::delete()
            .from_table(OrdersMonthly::Table)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&clear_summary).execute(&mut *conn).await?;

        let insert = Self::summary_insert_sql(horizon_us)?;
        let inserted = sqlx::query(&insert).execute(&mut *conn).await?;

        Ok(inserted.rows_affected())
    }

    /// Earliest and latest order instant, as `lo` and `hi`.
    fn instant_range_sql(horizon_us: Option<i64>) -> String {
        let mut range = Query::select();
        range
            .expr_as(Func::min(Expr::col(Orders::OrderInstantUs)), Alias::new("lo"))
            .expr_as(Func::max(Expr::col(Orders::OrderInstantUs)), Alias::new("hi"))
            .from(Orders::Table);
        if let Some(cutoff) = horizon_us {
            range.and_where(Expr::col(Orders::OrderInstantUs).gte(cutoff));
        }
        range.to_string(SqliteQueryBuilder)
    }

    fn month_bounds_insert_sql(bounds: &[(i32, u32, i64, i64)]) -> String {
        let mut insert = Query::insert();
        insert.into_table(MonthBounds::Table).columns([
            MonthBounds::Yr,
            MonthBounds::Mn,
            MonthBounds::StartUs,
            MonthBounds::EndUs,
        ]);
        for &(year, month, start_us, end_us) in bounds {
            insert.values_panic([year.into(), month.into(), start_us.into(), end_us.into()]);
        }
        insert.to_string(SqliteQueryBuilder)
    }

    /// `INSERT .. SELECT` counting orders per business month through the
    /// `month_bounds` range join.
    fn summary_insert_sql(horizon_us: Option<i64>) -> storage::Result<String> {
        let instant = Expr::col((Orders::Table, Orders::OrderInstantUs));
        let mut counts = Query::select();
        counts
            .column((MonthBounds::Table, MonthBounds::Yr))
            .column((MonthBounds::Table, MonthBounds::Mn))
            .expr(Func::count(Expr::col((Orders::Table, Orders::OrderId))))
            .from(Orders::Table)
            .inner_join(
                MonthBounds::Table,
                instant
                    .clone()
                    .gte(Expr::col((MonthBounds::Table, MonthBounds::StartUs)))
                    .and(instant.clone().lt(Expr::col((MonthBounds::Table, MonthBounds::EndUs)))),
            )
            .group_by_col((MonthBounds::Table, MonthBounds::Yr))
            .group_by_col((MonthBounds::Table, MonthBounds::Mn));
        if let Some(cutoff) = horizon_us {
            counts.and_where(instant.gte(cutoff));
        }

        Ok(Query::insert()
            .into_table(OrdersMonthly::Table)
            .columns([OrdersMonthly::Yr, OrdersMonthly::Mn, OrdersMonthly::TotalOrders])
            .select_from(counts)?
            .to_string(SqliteQueryBuilder))
    }

    fn repeat_customers_sql() -> String {
        let count = SimpleExpr::from(Func::count(Expr::col(Orders::OrderId)));
        Query::select()
            .column(Orders::MobileNumber)
            .expr_as(count.clone(), Alias::new("order_count"))
            .from(Orders::Table)
            .group_by_col(Orders::MobileNumber)
            .and_having(Expr::expr(count).gt(1))
            .order_by(Alias::new("order_count"), Order::Desc)
            .order_by(Orders::MobileNumber, Order::Asc)
            .to_string(SqliteQueryBuilder)
    }

    /// Sum of order amounts per customer attribute over a left join, with
    /// unmatched orders and missing attributes under `"Unknown"`.
    fn ranked_sum_query(attribute: Customers, cutoff_us: Option<i64>) -> String {
        let key = SimpleExpr::from(Func::coalesce([
            SimpleExpr::from(Expr::col((Customers::Table, attribute))),
            SimpleExpr::from(Expr::val(UNKNOWN)),
        ]));

        let mut select = Query::select();
        select
            .expr_as(key.clone(), Alias::new("key"))
            .expr_as(
                Func::sum(Expr::col((Orders::Table, Orders::TotalAmount))),
                Alias::new("amount"),
            )
            .from(Orders::Table)
            .left_join(
                Customers::Table,
                Expr::col((Orders::Table, Orders::MobileNumber))
                    .equals((Customers::Table, Customers::MobileNumber)),
            )
            .add_group_by([key.clone()])
            .order_by(Alias::new("amount"), Order::Desc)
            .order_by_expr(key, Order::Asc);
        if let Some(cutoff) = cutoff_us {
            select.and_where(Expr::col((Orders::Table, Orders::OrderInstantUs)).gte(cutoff));
        }
        select.to_string(SqliteQueryBuilder)
    }

    async fn fetch_ranked_sums(&self, query: &str) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(StorageError::from)?;
            let amount: f64 = row.try_get("amount").map_err(StorageError::from)?;
            out.push((key, amount));
        }
        Ok(out)
    }
}

/// UTC bounds `[start, end)` of every business month from the month of
/// `lo_us` through the month of `hi_us`.
fn month_bounds(zone: Tz, lo_us: i64, hi_us: i64) -> storage::Result<Vec<(i32, u32, i64, i64)>> {
    let instant = |micros: i64| {
        DateTime::from_timestamp_micros(micros).ok_or(StorageError::InvalidInstant { micros })
    };
    let last = business_month(instant(hi_us)?, zone);

    let mut bounds = Vec::new();
    let mut month = business_month(instant(lo_us)?, zone);
    loop {
        let next = next_month(month);
        match (month_start_utc(zone, month), month_start_utc(zone, next)) {
            (Some(start), Some(end)) => {
                bounds.push((month.0, month.1, start.timestamp_micros(), end.timestamp_micros()));
            }
            _ => return Err(StorageError::InvalidInstant { micros: hi_us }),
        }
        if month == last {
            break;
        }
        month = next;
    }
    Ok(bounds)
}

#[async_trait]
impl KpiEngine for SqliteKpiEngine {
    fn name(&self) -> &'static str {
        "pushdown"
    }

    async fn stage(&self, dataset: &CanonicalDataset, params: &KpiParams) -> Result<()> {
        self.staged.store(false, Ordering::Release);
        self.store.replace(dataset).await?;
        let months = self.refresh_monthly_summary(params).await?;
        self.staged.store(true, Ordering::Release);

        debug!(
            orders = dataset.orders.len(),
            months,
            "Canonical tables staged in SQLite"
        );
        Ok(())
    }

    async fn repeat_customers(&self, _params: &KpiParams) -> Result<Vec<RepeatCustomer>> {
        self.ensure_staged()?;

        let rows = sqlx::query(&Self::repeat_customers_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let order_count: i64 = row.try_get("order_count").map_err(StorageError::from)?;
            out.push(RepeatCustomer {
                mobile_number: row.try_get("mobile_number").map_err(StorageError::from)?,
                order_count: order_count as u64,
            });
        }
        Ok(out)
    }

    async fn monthly_trends(&self, _params: &KpiParams) -> Result<Vec<MonthlyOrders>> {
        self.ensure_staged()?;

        let query = Query::select()
            .columns([OrdersMonthly::Yr, OrdersMonthly::Mn, OrdersMonthly::TotalOrders])
            .from(OrdersMonthly::Table)
            .order_by(OrdersMonthly::Yr, Order::Asc)
            .order_by(OrdersMonthly::Mn, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let year: i64 = row.try_get("yr").map_err(StorageError::from)?;
            let month: i64 = row.try_get("mn").map_err(StorageError::from)?;
            let total_orders: i64 = row.try_get("total_orders").map_err(StorageError::from)?;
            out.push(MonthlyOrders {
                year: year as i32,
                month: month as u32,
                total_orders: total_orders as u64,
            });
        }
        Ok(out)
    }

    async fn regional_revenue(&self, _params: &KpiParams) -> Result<Vec<RegionRevenue>> {
        self.ensure_staged()?;

        let query = Self::ranked_sum_query(Customers::Region, None);
        Ok(self
            .fetch_ranked_sums(&query)
            .await?
            .into_iter()
            .map(|(region, revenue)| RegionRevenue { region, revenue })
            .collect())
    }

    async fn top_spenders(&self, params: &KpiParams) -> Result<Vec<CustomerSpend>> {
        self.ensure_staged()?;

        let cutoff = params.window_cutoff().timestamp_micros();
        let query = Self::ranked_sum_query(Customers::CustomerName, Some(cutoff));
        Ok(self
            .fetch_ranked_sums(&query)
            .await?
            .into_iter()
            .map(|(customer_name, total_spent)| CustomerSpend {
                customer_name,
                total_spent,
            })
            .collect())
    }
}
