//! Record normalization.
//!
//! Strips formatting noise from identity keys, coerces amounts, and maps
//! sentinel-like cells (`"NA"`, `"null"`, ...) to absent values. Nothing here
//! fails: malformed cells become absent or a default.

use tracing::debug;

use crate::model::{CanonicalCustomer, DropReason, DropTally, OrderLine, RawCustomer, RawOrderLine};

/// Default for absent categorical fields and unmatched lookups.
pub const UNKNOWN: &str = "Unknown";

/// Cell values treated as absent (after trimming).
pub const ABSENT_SENTINELS: [&str; 5] = ["", "NA", "null", "None", "NaN"];

/// Trimmed cell value, or `None` for blank and sentinel cells.
pub fn present(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if ABSENT_SENTINELS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Keep only the ASCII decimal digits of `value`.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mobile number as an identity key. A present cell with no digits maps to
/// the empty key; only blank and sentinel cells are absent.
pub fn mobile_key(value: Option<&str>) -> Option<String> {
    present(value).map(|v| digits_only(&v))
}

/// Numeric amount; absent or non-coercible cells become `0.0`.
pub fn coerce_amount(value: Option<&str>) -> f64 {
    present(value)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Mask an identity key for logging: first two and last two characters kept.
pub fn mask_mobile(mobile: &str) -> String {
    let chars: Vec<char> = mobile.chars().collect();
    if chars.len() < 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}

/// Normalize customer rows, excluding those without a name or mobile number.
///
/// Input order is preserved. Duplicates are left for the customer
/// deduplication engine.
pub fn normalize_customers<I>(rows: I, tally: &mut DropTally) -> Vec<CanonicalCustomer>
where
    I: IntoIterator<Item = RawCustomer>,
{
    let mut out = Vec::new();

    for row in rows {
        let Some(customer_name) = present(row.customer_name.as_deref()) else {
            tally.record(DropReason::MissingCustomerName);
            continue;
        };
        let Some(mobile_number) = mobile_key(row.mobile_number.as_deref()) else {
            tally.record(DropReason::MissingMobile);
            continue;
        };

        out.push(CanonicalCustomer {
            customer_id: present(row.customer_id.as_deref()),
            customer_name,
            mobile_number,
            region: present(row.region.as_deref()).unwrap_or_else(|| UNKNOWN.to_string()),
        });
    }

    debug!(kept = out.len(), "Normalized customer rows");
    out
}

/// Normalize order lines. No line is excluded here; required-field checks
/// happen in order deduplication.
pub fn normalize_order_lines<I>(rows: I) -> Vec<OrderLine>
where
    I: IntoIterator<Item = RawOrderLine>,
{
    rows.into_iter()
        .map(|row| OrderLine {
            order_id: present(row.order_id.as_deref()),
            mobile_number: mobile_key(row.mobile_number.as_deref()),
            order_date_time: present(row.order_date_time.as_deref()),
            total_amount: coerce_amount(row.total_amount.as_deref()),
        })
        .collect()
}
