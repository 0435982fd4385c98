//! Order deduplication keyed by order id.
//!
//! Line items of one order are assumed to repeat the order-level total, so
//! the first qualifying line stands for the whole order. If a source ever
//! ships partial per-line amounts this must become a sum.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{CanonicalOrder, DropReason, DropTally, ResolvedOrderLine};

/// Collapse resolved order lines into one canonical order per order id.
///
/// Lines without an order id, without a mobile number, or whose timestamp
/// did not resolve are excluded before grouping, so they can never be the
/// "first" line of a group. Output follows the first appearance of each id.
pub fn dedup_orders<I>(lines: I, tally: &mut DropTally) -> Vec<CanonicalOrder>
where
    I: IntoIterator<Item = ResolvedOrderLine>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for line in lines {
        let Some(order_id) = line.order_id else {
            tally.record(DropReason::MissingOrderId);
            continue;
        };
        let Some(mobile_number) = line.mobile_number else {
            tally.record(DropReason::MissingMobile);
            continue;
        };
        let Ok(order_instant_utc) = line.order_instant_utc else {
            tally.record(DropReason::UnresolvableTimestamp);
            continue;
        };

        if !seen.insert(order_id.clone()) {
            tally.record(DropReason::DuplicateOrderLine);
            continue;
        }

        out.push(CanonicalOrder {
            order_id,
            mobile_number,
            order_instant_utc,
            total_amount: line.total_amount,
        });
    }

    debug!(
        canonical = out.len(),
        duplicate_lines = tally.count(DropReason::DuplicateOrderLine),
        unresolved = tally.count(DropReason::UnresolvableTimestamp),
        "Deduplicated orders"
    );
    out
}
