//! Customer deduplication keyed by mobile number.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{CanonicalCustomer, DropReason, DropTally};

/// Keep the first customer row per mobile number, preserving input order.
///
/// Rows are expected to come from the normalizer, so rows without a name or
/// mobile number are already gone.
pub fn dedup_customers<I>(rows: I, tally: &mut DropTally) -> Vec<CanonicalCustomer>
where
    I: IntoIterator<Item = CanonicalCustomer>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        if seen.insert(row.mobile_number.clone()) {
            out.push(row);
        } else {
            tally.record(DropReason::DuplicateCustomer);
        }
    }

    debug!(
        canonical = out.len(),
        duplicates = tally.count(DropReason::DuplicateCustomer),
        "Deduplicated customers"
    );
    out
}
