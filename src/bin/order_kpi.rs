//! order-kpi: batch KPI report
//!
//! Loads the customers and orders CSV files, builds the canonical tables and
//! prints the four KPI tables to stdout.
//!
//! ## Configuration
//! - First argument: YAML config file (optional)
//! - ORDER_KPI_CONFIG: YAML config file (optional)
//! - ORDER_KPI__<SECTION>__<KEY>: overrides, e.g. ORDER_KPI__EXECUTION__STRATEGY=pushdown
//! - ORDER_KPI_LOG: tracing filter (default: info)

use std::process::ExitCode;

use chrono::Utc;
use tracing::{error, info};

use order_kpi::config::{Config, OutputFormat};
use order_kpi::ingest::{load_customers_csv, load_order_lines_csv};
use order_kpi::pipeline::{kpi_params, Pipeline};
use order_kpi::report::{render_json, render_text};
use order_kpi::utils::bootstrap::init_tracing;

async fn run(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path.as_deref())?;
    let pipeline = Pipeline::from_config(&config).await?;
    let params = kpi_params(&config.pipeline, Utc::now())?;

    let customers = load_customers_csv(&config.input.customers_csv)?;
    let order_lines = load_order_lines_csv(&config.input.orders_csv)?;

    let output = pipeline.run(customers, order_lines, &params).await?;

    match config.output.format {
        OutputFormat::Text => print!("{}", render_text(&output.report)),
        OutputFormat::Json => println!("{}", render_json(&output.report, &output.stats)?),
    }

    info!(
        engine = pipeline.engine_name(),
        orders = output.stats.canonical_orders,
        "order-kpi finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(std::env::args().nth(1)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "order-kpi failed");
            ExitCode::FAILURE
        }
    }
}
