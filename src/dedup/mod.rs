//! Deduplication engines.
//!
//! Both engines are first-write-wins over input order: the first qualifying
//! row of a key is kept verbatim and later rows of that key are discarded.
//! Fields are never merged across duplicates.

mod customers;
mod orders;

pub use customers::dedup_customers;
pub use orders::dedup_orders;
