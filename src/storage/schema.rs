//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Canonical customers table.
#[derive(Iden)]
pub enum Customers {
    Table,
    #[iden = "position"]
    Position,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "customer_name"]
    CustomerName,
    #[iden = "mobile_number"]
    MobileNumber,
    #[iden = "region"]
    Region,
}

/// Canonical orders table.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "position"]
    Position,
    #[iden = "order_id"]
    OrderId,
    #[iden = "mobile_number"]
    MobileNumber,
    #[iden = "order_instant_us"]
    OrderInstantUs,
    #[iden = "total_amount"]
    TotalAmount,
}

/// Precomputed monthly order counts.
#[derive(Iden)]
pub enum OrdersMonthly {
    Table,
    #[iden = "yr"]
    Yr,
    #[iden = "mn"]
    Mn,
    #[iden = "total_orders"]
    TotalOrders,
}

/// Connection-local UTC bounds of business-timezone months.
#[derive(Iden)]
pub enum MonthBounds {
    Table,
    #[iden = "yr"]
    Yr,
    #[iden = "mn"]
    Mn,
    #[iden = "start_us"]
    StartUs,
    #[iden = "end_us"]
    EndUs,
}

/// SQL for creating the customers table.
pub const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    position INTEGER NOT NULL,
    customer_id TEXT,
    customer_name TEXT NOT NULL,
    mobile_number TEXT NOT NULL PRIMARY KEY,
    region TEXT NOT NULL
);
"#;

/// SQL for creating the orders table.
pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    position INTEGER NOT NULL,
    order_id TEXT NOT NULL PRIMARY KEY,
    mobile_number TEXT NOT NULL,
    order_instant_us INTEGER NOT NULL,
    total_amount REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_mobile ON orders(mobile_number);
CREATE INDEX IF NOT EXISTS idx_orders_instant ON orders(order_instant_us);
"#;

/// SQL for creating the monthly summary table.
pub const CREATE_ORDERS_MONTHLY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders_monthly (
    yr INTEGER NOT NULL,
    mn INTEGER NOT NULL,
    total_orders INTEGER NOT NULL,
    PRIMARY KEY (yr, mn)
);
"#;

/// SQL for creating the month bounds scratch table.
pub const CREATE_MONTH_BOUNDS_TABLE: &str = r#"
CREATE TEMP TABLE IF NOT EXISTS month_bounds (
    yr INTEGER NOT NULL,
    mn INTEGER NOT NULL,
    start_us INTEGER NOT NULL,
    end_us INTEGER NOT NULL,
    PRIMARY KEY (yr, mn)
);
"#;
