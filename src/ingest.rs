//! CSV ingestion of raw customer and order-line rows.
//!
//! Cells are carried through untouched as `Option<String>`; blank cells
//! become `None`. Cleaning is left to the normalizer.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::model::{RawCustomer, RawOrderLine};

/// Errors raised while reading source files.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{file}: missing required column '{column}'")]
    MissingColumn { file: String, column: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;

const CUSTOMER_ID: &str = "customer_id";
const CUSTOMER_NAME: &str = "customer_name";
const MOBILE_NUMBER: &str = "mobile_number";
const REGION: &str = "region";
const ORDER_ID: &str = "order_id";
const ORDER_DATE_TIME: &str = "order_date_time";
const TOTAL_AMOUNT: &str = "total_amount";

/// Header positions of one source file.
struct Columns<'a> {
    source: &'a str,
    headers: StringRecord,
}

impl<'a> Columns<'a> {
    fn new(source: &'a str, headers: StringRecord) -> Self {
        Self { source, headers }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
    }

    fn required(&self, column: &str) -> Result<usize> {
        self.position(column).ok_or_else(|| IngestError::MissingColumn {
            file: self.source.to_string(),
            column: column.to_string(),
        })
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read customer rows from CSV with a header line.
///
/// `customer_name` and `mobile_number` columns are required, the others are
/// read when present.
pub fn read_customers<R: Read>(source: &str, reader: R) -> Result<Vec<RawCustomer>> {
    let mut csv = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = Columns::new(source, csv.headers()?.clone());

    let customer_id = columns.position(CUSTOMER_ID);
    let customer_name = columns.required(CUSTOMER_NAME)?;
    let mobile_number = columns.required(MOBILE_NUMBER)?;
    let region = columns.position(REGION);

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        rows.push(RawCustomer {
            customer_id: cell(&record, customer_id),
            customer_name: cell(&record, Some(customer_name)),
            mobile_number: cell(&record, Some(mobile_number)),
            region: cell(&record, region),
        });
    }
    Ok(rows)
}

/// Read order lines from CSV with a header line.
///
/// Columns other than the four the pipeline uses (`customer_id`, `sku_id`,
/// `sku_count`, ...) are ignored.
pub fn read_order_lines<R: Read>(source: &str, reader: R) -> Result<Vec<RawOrderLine>> {
    let mut csv = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = Columns::new(source, csv.headers()?.clone());

    let order_id = columns.required(ORDER_ID)?;
    let mobile_number = columns.required(MOBILE_NUMBER)?;
    let order_date_time = columns.required(ORDER_DATE_TIME)?;
    let total_amount = columns.required(TOTAL_AMOUNT)?;

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        rows.push(RawOrderLine {
            order_id: cell(&record, Some(order_id)),
            mobile_number: cell(&record, Some(mobile_number)),
            order_date_time: cell(&record, Some(order_date_time)),
            total_amount: cell(&record, Some(total_amount)),
        });
    }
    Ok(rows)
}

pub fn load_customers_csv(path: impl AsRef<Path>) -> Result<Vec<RawCustomer>> {
    let path = path.as_ref();
    let rows = read_customers(&path.display().to_string(), File::open(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "Loaded customers");
    Ok(rows)
}

pub fn load_order_lines_csv(path: impl AsRef<Path>) -> Result<Vec<RawOrderLine>> {
    let path = path.as_ref();
    let rows = read_order_lines(&path.display().to_string(), File::open(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "Loaded order lines");
    Ok(rows)
}
