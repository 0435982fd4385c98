//! Civil-timezone resolution.
//!
//! Naive local timestamps are placed on the UTC timeline using the rules of
//! a named zone. Ambiguous wall-clock times (fall-back overlap) never
//! resolve. Nonexistent wall-clock times (spring-forward gap) are shifted
//! forward by the length of the gap, i.e. read with the offset that was in
//! force just before the transition.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, Months, NaiveDate, NaiveDateTime,
    Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::model::{OrderLine, ResolvedOrderLine};

/// Accepted naive layouts, tried in order. `%.f` also matches no fraction.
const NAIVE_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Step and reach of the backwards search for the pre-gap offset.
const GAP_PROBE_STEP_MINUTES: i64 = 15;
const GAP_PROBE_STEPS: i64 = 26 * 4;

/// Failure marker of timestamp resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unresolved {
    #[error("timestamp is not a recognised naive date-time")]
    Unparseable,
    #[error("local time occurs twice in the source timezone")]
    Ambiguous,
    #[error("local time cannot be placed on the timeline")]
    OutOfRange,
}

/// Parse a naive calendar timestamp. Strings carrying an offset are rejected.
pub fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_ONLY_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Offset in force shortly before `naive`, skipping over a gap.
fn offset_before_gap(zone: Tz, naive: NaiveDateTime) -> Option<FixedOffset> {
    (1..=GAP_PROBE_STEPS).find_map(|step| {
        let probe = naive.checked_sub_signed(Duration::minutes(GAP_PROBE_STEP_MINUTES * step))?;
        match zone.offset_from_local_datetime(&probe) {
            LocalResult::Single(offset) => Some(offset.fix()),
            _ => None,
        }
    })
}

/// Place a nonexistent local time on the timeline with the pre-gap offset.
fn shift_forward(zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let offset = offset_before_gap(zone, naive)?;
    let utc = naive.checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
    Some(Utc.from_utc_datetime(&utc))
}

/// Localize without failing on transitions: ambiguous picks the earlier
/// instant, nonexistent shifts forward.
pub fn localize_lenient(zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => shift_forward(zone, naive),
    }
}

/// Resolves naive source timestamps in one civil zone.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneResolver {
    zone: Tz,
}

impl TimezoneResolver {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    /// Parse and resolve a raw timestamp string.
    pub fn resolve(&self, raw: &str) -> Result<DateTime<Utc>, Unresolved> {
        let naive = parse_naive(raw).ok_or(Unresolved::Unparseable)?;
        self.resolve_naive(naive)
    }

    /// Resolve a wall-clock time of the source zone.
    pub fn resolve_naive(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>, Unresolved> {
        match self.zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(_, _) => Err(Unresolved::Ambiguous),
            LocalResult::None => shift_forward(self.zone, naive).ok_or(Unresolved::OutOfRange),
        }
    }

    /// Resolve the timestamp of every line; failures stay on the line.
    pub fn resolve_lines<I>(&self, lines: I) -> Vec<ResolvedOrderLine>
    where
        I: IntoIterator<Item = OrderLine>,
    {
        lines
            .into_iter()
            .map(|line| ResolvedOrderLine {
                order_instant_utc: line
                    .order_date_time
                    .as_deref()
                    .ok_or(Unresolved::Unparseable)
                    .and_then(|raw| self.resolve(raw)),
                order_id: line.order_id,
                mobile_number: line.mobile_number,
                total_amount: line.total_amount,
            })
            .collect()
    }
}

/// Calendar month of `instant` on the wall clock of `zone`.
pub fn business_month(instant: DateTime<Utc>, zone: Tz) -> (i32, u32) {
    let local = instant.with_timezone(&zone);
    (local.year(), local.month())
}

pub fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// First instant of a calendar month in `zone`.
pub fn month_start_utc(zone: Tz, (year, month): (i32, u32)) -> Option<DateTime<Utc>> {
    let midnight = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    localize_lenient(zone, midnight)
}

/// Start of a trailing window of `days` calendar days ending at `now`,
/// counted on the wall clock of `zone`.
pub fn trailing_cutoff(now: DateTime<Utc>, zone: Tz, days: i64) -> DateTime<Utc> {
    let local = now.with_timezone(&zone).naive_local();
    local
        .checked_sub_signed(Duration::days(days))
        .and_then(|naive| localize_lenient(zone, naive))
        .unwrap_or_else(|| now - Duration::days(days))
}

/// `now` minus `months` calendar months on the wall clock of `zone`.
pub fn horizon_cutoff(now: DateTime<Utc>, zone: Tz, months: u32) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&zone).naive_local();
    local
        .checked_sub_months(Months::new(months))
        .and_then(|naive| localize_lenient(zone, naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_naive_accepts_irregular_layouts() {
        let expected = naive("2024-01-05 10:15:00");
        for raw in [
            "2024-01-05 10:15:00",
            "2024-01-05T10:15:00",
            " 2024-01-05 10:15 ",
            "2024/01/05 10:15:00",
            "05-01-2024 10:15:00",
            "01/05/2024 10:15:00",
        ] {
            assert_eq!(parse_naive(raw), Some(expected), "layout {:?}", raw);
        }
        assert_eq!(
            parse_naive("2024-01-05 10:15:00.250").map(|n| n.and_utc().timestamp_subsec_millis()),
            Some(250)
        );
        assert_eq!(parse_naive("2024-01-05"), Some(naive("2024-01-05 00:00:00")));
    }

    #[test]
    fn test_parse_naive_rejects_garbage_and_offsets() {
        assert_eq!(parse_naive("yesterday"), None);
        assert_eq!(parse_naive("2024-13-40 10:00:00"), None);
        assert_eq!(parse_naive("2024-01-05T10:15:00+05:30"), None);
        assert_eq!(parse_naive("2024-01-05T10:15:00Z"), None);
    }

    #[test]
    fn test_resolve_fixed_offset_zone() {
        let resolver = TimezoneResolver::new(chrono_tz::Asia::Kolkata);
        assert_eq!(resolver.resolve("2024-01-05 10:00:00"), Ok(utc("2024-01-05T04:30:00Z")));
    }

    #[test]
    fn test_resolve_unparseable_is_failure_marker() {
        let resolver = TimezoneResolver::new(chrono_tz::Asia::Kolkata);
        assert_eq!(resolver.resolve("not a date"), Err(Unresolved::Unparseable));
    }

    #[test]
    fn test_nonexistent_time_shifts_forward_by_gap() {
        let zone = chrono_tz::America::New_York;
        let resolver = TimezoneResolver::new(zone);

        let resolved = resolver.resolve("2024-03-10 02:30:00").unwrap();

        assert_eq!(resolved, utc("2024-03-10T07:30:00Z"));
        assert_eq!(resolved.with_timezone(&zone).naive_local(), naive("2024-03-10 03:30:00"));
    }

    #[test]
    fn test_ambiguous_time_never_resolves() {
        let resolver = TimezoneResolver::new(chrono_tz::America::New_York);
        assert_eq!(resolver.resolve("2024-11-03 01:30:00"), Err(Unresolved::Ambiguous));
        // Either side of the overlap is fine.
        assert_eq!(resolver.resolve("2024-11-03 00:59:59"), Ok(utc("2024-11-03T04:59:59Z")));
        assert_eq!(resolver.resolve("2024-11-03 02:00:00"), Ok(utc("2024-11-03T07:00:00Z")));
    }

    #[test]
    fn test_round_trip_reproduces_wall_clock() {
        let zone = chrono_tz::Europe::Berlin;
        let resolver = TimezoneResolver::new(zone);
        for raw in ["2024-01-15 08:00:00", "2024-07-01 23:59:59", "2024-03-31 01:59:00"] {
            let instant = resolver.resolve(raw).unwrap();
            assert_eq!(instant.with_timezone(&zone).naive_local(), naive(raw));
        }
    }

    #[test]
    fn test_resolve_lines_keeps_failures_on_the_line() {
        let resolver = TimezoneResolver::new(chrono_tz::UTC);
        let lines = resolver.resolve_lines(vec![
            OrderLine {
                order_id: Some("O1".to_string()),
                mobile_number: Some("1".to_string()),
                order_date_time: None,
                total_amount: 1.0,
            },
            OrderLine {
                order_id: Some("O2".to_string()),
                mobile_number: Some("1".to_string()),
                order_date_time: Some("2024-01-01 00:00:00".to_string()),
                total_amount: 2.0,
            },
        ]);

        assert_eq!(lines[0].order_instant_utc, Err(Unresolved::Unparseable));
        assert_eq!(lines[1].order_instant_utc, Ok(utc("2024-01-01T00:00:00Z")));
        assert_eq!(lines[1].order_id.as_deref(), Some("O2"));
    }

    #[test]
    fn test_business_month_uses_local_wall_clock() {
        let zone = chrono_tz::Asia::Kolkata;
        assert_eq!(business_month(utc("2024-01-31T20:00:00Z"), zone), (2024, 2));
        assert_eq!(business_month(utc("2024-01-31T18:29:59Z"), zone), (2024, 1));
    }

    #[test]
    fn test_month_start_utc() {
        assert_eq!(
            month_start_utc(chrono_tz::Asia::Kolkata, (2024, 3)),
            Some(utc("2024-02-29T18:30:00Z"))
        );
        assert_eq!(next_month((2024, 12)), (2025, 1));
        assert_eq!(next_month((2024, 2)), (2024, 3));
    }

    #[test]
    fn test_month_start_inside_midnight_gap_shifts_forward() {
        // DST began at local midnight on 2018-11-04 in Sao Paulo.
        assert_eq!(
            month_start_utc(chrono_tz::America::Sao_Paulo, (2018, 11)),
            Some(utc("2018-11-01T03:00:00Z"))
        );
        assert_eq!(
            localize_lenient(chrono_tz::America::Sao_Paulo, naive("2018-11-04 00:00:00")),
            Some(utc("2018-11-04T03:00:00Z"))
        );
    }

    #[test]
    fn test_trailing_cutoff_counts_calendar_days() {
        let zone = chrono_tz::America::New_York;
        let now = utc("2024-03-20T12:00:00Z");
        // 08:00 EDT minus 30 days is 08:00 EST.
        assert_eq!(trailing_cutoff(now, zone, 30), utc("2024-02-19T13:00:00Z"));
    }

    #[test]
    fn test_horizon_cutoff_counts_calendar_months() {
        let zone = chrono_tz::Asia::Kolkata;
        let now = utc("2024-03-31T06:30:00Z");
        assert_eq!(horizon_cutoff(now, zone, 1), Some(utc("2024-02-29T06:30:00Z")));
    }
}
