//! SQLite CanonicalStore implementation.

use async_trait::async_trait;
use chrono::DateTime;
use sea_query::{Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::model::{CanonicalCustomer, CanonicalDataset, CanonicalOrder};
use crate::storage::schema::{Customers, Orders, CREATE_CUSTOMERS_TABLE, CREATE_ORDERS_TABLE};
use crate::storage::{CanonicalStore, Result, StorageError};

/// Rows per INSERT statement.
const INSERT_BATCH: usize = 500;

/// SQLite implementation of CanonicalStore.
///
/// Instants are stored as UTC epoch microseconds so range predicates stay
/// plain integer comparisons. `position` records input order.
#[derive(Clone)]
pub struct SqliteCanonicalStore {
    pool: SqlitePool,
}

impl SqliteCanonicalStore {
    /// Create a new SQLite canonical store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the canonical tables if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_CUSTOMERS_TABLE).execute(&self.pool).await?;
        sqlx::raw_sql(CREATE_ORDERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Rewrite both tables within an already-started transaction.
    async fn write_tables(conn: &mut SqliteConnection, dataset: &CanonicalDataset) -> Result<()> {
        let clear_customers = Query::delete()
            .from_table(Customers::Table)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&clear_customers).execute(&mut *conn).await?;

        let clear_orders = Query::delete().from_table(Orders::Table).to_string(SqliteQueryBuilder);
        sqlx::query(&clear_orders).execute(&mut *conn).await?;

        for (batch, chunk) in dataset.customers.chunks(INSERT_BATCH).enumerate() {
            let insert = Self::customers_insert_sql(batch * INSERT_BATCH, chunk);
            sqlx::query(&insert).execute(&mut *conn).await?;
        }

        for (batch, chunk) in dataset.orders.chunks(INSERT_BATCH).enumerate() {
            let insert = Self::orders_insert_sql(batch * INSERT_BATCH, chunk);
            sqlx::query(&insert).execute(&mut *conn).await?;
        }

        Ok(())
    }

    /// Multi-row INSERT for `chunk`, numbering positions from `first`.
    fn customers_insert_sql(first: usize, chunk: &[CanonicalCustomer]) -> String {
        let mut insert = Query::insert();
        insert.into_table(Customers::Table).columns([
            Customers::Position,
            Customers::CustomerId,
            Customers::CustomerName,
            Customers::MobileNumber,
            Customers::Region,
        ]);
        for (offset, customer) in chunk.iter().enumerate() {
            insert.values_panic([
                ((first + offset) as i64).into(),
                customer.customer_id.clone().into(),
                customer.customer_name.clone().into(),
                customer.mobile_number.clone().into(),
                customer.region.clone().into(),
            ]);
        }
        insert.to_string(SqliteQueryBuilder)
    }

    fn orders_insert_sql(first: usize, chunk: &[CanonicalOrder]) -> String {
        let mut insert = Query::insert();
        insert.into_table(Orders::Table).columns([
            Orders::Position,
            Orders::OrderId,
            Orders::MobileNumber,
            Orders::OrderInstantUs,
            Orders::TotalAmount,
        ]);
        for (offset, order) in chunk.iter().enumerate() {
            insert.values_panic([
                ((first + offset) as i64).into(),
                order.order_id.clone().into(),
                order.mobile_number.clone().into(),
                order.order_instant_utc.timestamp_micros().into(),
                order.total_amount.into(),
            ]);
        }
        insert.to_string(SqliteQueryBuilder)
    }
}

#[async_trait]
impl CanonicalStore for SqliteCanonicalStore {
    async fn replace(&self, dataset: &CanonicalDataset) -> Result<()> {
        self.init().await?;

        // BEGIN IMMEDIATE takes the write lock up front so readers see either
        // the previous tables or the new ones.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::write_tables(&mut conn, dataset).await;

        match result {
            Ok(()) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(e.into());
                }
                debug!(
                    customers = dataset.customers.len(),
                    orders = dataset.orders.len(),
                    "Canonical tables replaced"
                );
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<CanonicalDataset> {
        self.init().await?;

        let query = Query::select()
            .columns([
                Customers::CustomerId,
                Customers::CustomerName,
                Customers::MobileNumber,
                Customers::Region,
            ])
            .from(Customers::Table)
            .order_by(Customers::Position, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut customers = Vec::with_capacity(rows.len());
        for row in rows {
            customers.push(CanonicalCustomer {
                customer_id: row.try_get("customer_id")?,
                customer_name: row.try_get("customer_name")?,
                mobile_number: row.try_get("mobile_number")?,
                region: row.try_get("region")?,
            });
        }

        let query = Query::select()
            .columns([
                Orders::OrderId,
                Orders::MobileNumber,
                Orders::OrderInstantUs,
                Orders::TotalAmount,
            ])
            .from(Orders::Table)
            .order_by(Orders::Position, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let micros: i64 = row.try_get("order_instant_us")?;
            orders.push(CanonicalOrder {
                order_id: row.try_get("order_id")?,
                mobile_number: row.try_get("mobile_number")?,
                order_instant_utc: DateTime::from_timestamp_micros(micros)
                    .ok_or(StorageError::InvalidInstant { micros })?,
                total_amount: row.try_get("total_amount")?,
            });
        }

        Ok(CanonicalDataset { customers, orders })
    }
}
