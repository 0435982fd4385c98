//! In-memory and pushdown execution must return the same report for the same
//! raw input.

mod common;

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use proptest::prelude::*;

use common::{in_memory_engine, pushdown_engine, raw_customer, raw_line, utc};
use order_kpi::{KpiParams, Pipeline};

const ZONES: [Tz; 5] = [
    chrono_tz::UTC,
    chrono_tz::America::New_York,
    chrono_tz::America::Sao_Paulo,
    chrono_tz::Asia::Kolkata,
    chrono_tz::Australia::Lord_Howe,
];
const NAMES: [&str; 4] = ["Asha", "Ravi", "Meera", "NA"];
const REGIONS: [&str; 4] = ["North", "South", "East", ""];

fn timestamp(minutes: i64) -> String {
    let base = NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (base + Duration::minutes(minutes))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_strategies_agree(
        customers in prop::collection::vec((0u8..8, 0usize..4, 0usize..4), 0..10),
        lines in prop::collection::vec((0u8..30, 0u8..10, 0i64..(420 * 24 * 60), 0u32..500), 0..60),
        source in 0usize..5,
        business in 0usize..5,
        window_days in 1i64..90,
        horizon in prop::option::of(1u32..14),
    ) {
        let customers: Vec<_> = customers
            .iter()
            .map(|(mobile, name, region)| {
                raw_customer("C", NAMES[*name], &format!("90000000{:02}", mobile), REGIONS[*region])
            })
            .collect();
        let lines: Vec<_> = lines
            .iter()
            .map(|(id, mobile, minutes, amount)| {
                raw_line(
                    &format!("O{}", id),
                    &format!("90000000{:02}", mobile),
                    &timestamp(*minutes),
                    &amount.to_string(),
                )
            })
            .collect();
        let params = KpiParams::new(ZONES[business], utc(2024, 2, 15, 12, 0))
            .with_window_days(window_days)
            .unwrap()
            .with_horizon_months(horizon);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (local, pushed) = runtime.block_on(async {
            let local = Pipeline::new(ZONES[source], in_memory_engine())
                .run(customers.clone(), lines.clone(), &params)
                .await
                .unwrap();
            let pushed = Pipeline::new(ZONES[source], pushdown_engine().await)
                .run(customers, lines, &params)
                .await
                .unwrap();
            (local, pushed)
        });

        prop_assert_eq!(&local.dataset, &pushed.dataset);
        prop_assert!(
            local.report.matches(&pushed.report, 1e-6),
            "in-memory {:?}\npushdown {:?}",
            local.report,
            pushed.report
        );
    }
}
