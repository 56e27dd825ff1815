//! End-to-end tests through the strategy manager and sweep engine.
//!
//! Tests cover:
//! - Known-value backtest of a 50/50 holding on a continuous calendar
//! - Rebalancing-log compaction and hysteresis switching
//! - Mid-run staleness failures keeping the partial path
//! - Bit-identical reruns and sweep determinism
//! - Constraint filtering and ranking over a real strategy

mod common;

use common::*;
use pitsweep::domain::error::{LookupError, PitError};
use pitsweep::domain::market_data::MarketData;
use pitsweep::domain::params::ParamPath;
use pitsweep::domain::strategy::CASH;
use pitsweep::domain::sweep::{ParameterSpec, ParameterSweepEngine, RankMetric, SweepSpec};
use serde_json::json;

fn fifty_fifty() -> serde_json::Value {
    json!({"weights": {"SPY": 0.0, "AGG": 0.0, "A": 0.5, "B": 0.5}})
}

mod backtest_pipeline {
    use super::*;

    #[test]
    fn fifty_fifty_known_values() {
        let m = manager(
            rising_and_flat(5),
            continuous_config(date(2020, 1, 1), date(2020, 1, 5)),
        );
        let result = m
            .execute("fixed_weights", date(2020, 1, 1), date(2020, 1, 5), &fifty_fifty())
            .unwrap();

        let expected = [75.0, 75.5, 76.0, 76.5, 77.0];
        assert_eq!(result.len(), expected.len());
        for (value, want) in result.portfolio_values.iter().zip(expected) {
            assert!((value - want).abs() < 1e-12, "{value} != {want}");
        }
        assert_eq!(result.date_range.first(), Some(&date(2020, 1, 1)));
        assert_eq!(result.date_range.last(), Some(&date(2020, 1, 5)));
    }

    #[test]
    fn unchanged_allocation_logs_once() {
        let m = manager(
            rising_and_flat(5),
            continuous_config(date(2020, 1, 1), date(2020, 1, 5)),
        );
        let result = m
            .execute("fixed_weights", date(2020, 1, 1), date(2020, 1, 5), &fifty_fifty())
            .unwrap();
        assert_eq!(result.rebalancing_log.len(), 1);
        assert_eq!(result.rebalancing_log[0].date, date(2020, 1, 1));
        assert_eq!(result.rebalancing_log[0].allocation.get("A"), Some(0.5));
        assert_eq!(result.rebalancing_log[0].allocation.get("SPY"), None);
    }

    #[test]
    fn buy_and_hold_tracks_the_ticker() {
        let m = manager(
            rising_and_flat(5),
            continuous_config(date(2020, 1, 1), date(2020, 1, 5)),
        );
        let result = m
            .execute(
                "buy_and_hold",
                date(2020, 1, 1),
                date(2020, 1, 5),
                &json!({"ticker": "A", "seed": 1000.0}),
            )
            .unwrap();
        // 10 units of A from 100 to 104
        assert!((result.portfolio_values[0] - 1000.0).abs() < 1e-9);
        assert!((result.portfolio_values[4] - 1040.0).abs() < 1e-9);
        assert!((result.total_return() - 0.04).abs() < 1e-12);
        assert_eq!(result.rebalancing_log.len(), 1);
    }

    #[test]
    fn identical_runs_are_bit_identical() {
        let m = manager(
            rising_and_flat(30),
            continuous_config(date(2020, 1, 1), date(2020, 1, 30)),
        );
        let params = json!({"ticker": "A", "seed": 12345.678});
        let a = m.execute("buy_and_hold", date(2020, 1, 1), date(2020, 1, 30), &params).unwrap();
        let b = m.execute("buy_and_hold", date(2020, 1, 1), date(2020, 1, 30), &params).unwrap();

        assert_eq!(a, b);
        let bits = |r: &pitsweep::domain::backtest::BacktestResult| -> Vec<u64> {
            r.portfolio_values.iter().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn sub_period_extraction() {
        let m = manager(
            rising_and_flat(5),
            continuous_config(date(2020, 1, 1), date(2020, 1, 5)),
        );
        let full = m
            .execute("fixed_weights", date(2020, 1, 1), date(2020, 1, 5), &fifty_fifty())
            .unwrap();
        let slice = full.extract_period(date(2020, 1, 2), date(2020, 1, 4)).unwrap();

        assert_eq!(slice.portfolio_values, vec![75.5, 76.0, 76.5]);
        // the only log entry is on day one
        assert!(slice.rebalancing_log.is_empty());
        let normalized = slice.normalized();
        assert!((normalized[0] - 100.0).abs() < 1e-12);
        assert!((normalized[2] - 76.5 / 75.5 * 100.0).abs() < 1e-9);
    }
}

mod ma_switch_pipeline {
    use super::*;

    fn market() -> MarketData {
        let mut values = vec![100.0; 10];
        values.extend([80.0; 10]);
        values.extend([100.0; 10]);
        let start = date(2020, 1, 1);
        MarketData::from_series([
            series("SPY", daily(start, &values)),
            series("QQQ", daily(start, &values)),
        ])
        .unwrap()
    }

    #[test]
    fn switches_out_and_back_in() {
        let m = manager(market(), continuous_config(date(2020, 1, 1), date(2020, 1, 30)));
        let params = json!({
            "window_days": 2,
            "thresholds": {"exit": 0.95, "enter": 1.05}
        });
        let result = m
            .execute("ma_switch", date(2020, 1, 1), date(2020, 1, 30), &params)
            .unwrap();

        let log: Vec<(chrono::NaiveDate, &str)> = result
            .rebalancing_log
            .iter()
            .map(|e| (e.date, e.mode.as_str()))
            .collect();
        assert_eq!(
            log,
            vec![
                (date(2020, 1, 1), "risk_on"),
                (date(2020, 1, 11), "risk_off"),
                (date(2020, 1, 21), "risk_on"),
            ]
        );
        // 100 QQQ, sold at 80 for 8000 cash, back into 80 QQQ at 100
        assert_eq!(result.rebalancing_log[1].allocation.get(CASH), Some(8000.0));
        assert!((result.rebalancing_log[2].allocation.get("QQQ").unwrap() - 80.0).abs() < 1e-9);
        assert!((result.final_value().unwrap() - 8000.0).abs() < 1e-9);
    }
}

mod staleness {
    use super::*;

    #[test]
    fn gap_beyond_the_bound_fails_mid_run() {
        let start = date(2020, 1, 1);
        let mut points = daily(start, &[10.0, 11.0]);
        points.extend(daily(date(2020, 3, 1), &[12.0, 13.0]));
        let market = MarketData::from_series([series("M", points)]).unwrap();

        let mut config = continuous_config(start, date(2020, 3, 2));
        config.max_staleness_days = 30;
        let m = manager(market, config);

        let failure = m
            .execute(
                "fixed_weights",
                start,
                date(2020, 3, 2),
                &json!({"weights": {"SPY": 0, "AGG": 0, "M": 1.0}}),
            )
            .unwrap_err();

        assert_eq!(failure.date, Some(date(2020, 2, 2)));
        assert_eq!(failure.ticker(), Some("M"));
        assert!(matches!(
            failure.error,
            PitError::Lookup(LookupError::StaleData { age_days: 31, .. })
        ));
        // Jan 1 through Feb 1 simulated before the failure
        assert_eq!(failure.partial.len(), 32);
        assert_eq!(failure.partial.portfolio_values[31], 11.0);
    }

    #[test]
    fn same_gap_passes_with_a_wider_bound() {
        let start = date(2020, 1, 1);
        let mut points = daily(start, &[10.0, 11.0]);
        points.extend(daily(date(2020, 3, 1), &[12.0, 13.0]));
        let market = MarketData::from_series([series("M", points)]).unwrap();

        let mut config = continuous_config(start, date(2020, 3, 2));
        config.max_staleness_days = 60;
        let m = manager(market, config);

        let result = m
            .execute(
                "fixed_weights",
                start,
                date(2020, 3, 2),
                &json!({"weights": {"SPY": 0, "AGG": 0, "M": 1.0}}),
            )
            .unwrap();
        assert_eq!(result.final_value(), Some(13.0));
    }
}

mod sweeps {
    use super::*;

    fn market() -> MarketData {
        let start = date(2020, 1, 1);
        MarketData::from_series([
            series("SPY", linear(start, 10, 100.0, 1.0)),
            series("AGG", linear(start, 10, 50.0, 0.0)),
        ])
        .unwrap()
    }

    fn spec() -> SweepSpec {
        SweepSpec::new(
            "fixed_weights",
            vec![
                ParameterSpec::new("weights[SPY]", 0.0, 2.0, 3).unwrap(),
                ParameterSpec::new("weights[AGG]", 0.0, 2.0, 3).unwrap(),
            ],
            vec![vec![
                ParamPath::parse("weights.SPY").unwrap(),
                ParamPath::parse("weights.AGG").unwrap(),
            ]],
        )
    }

    fn engine() -> ParameterSweepEngine {
        ParameterSweepEngine::new(manager(
            market(),
            continuous_config(date(2020, 1, 1), date(2020, 1, 10)),
        ))
        .with_threads(2)
    }

    #[test]
    fn constraint_keeps_three_of_nine() {
        let result = engine().run(&spec(), date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        assert_eq!(result.grid_size, 9);
        assert_eq!(result.filtered_out, 6);
        let kept: Vec<(f64, f64)> = result
            .entries
            .iter()
            .map(|e| (e.combination.assignments[0].1, e.combination.assignments[1].1))
            .collect();
        assert_eq!(kept, vec![(0.0, 1.0), (0.0, 2.0), (1.0, 2.0)]);
        assert!(result.failures().is_empty());
    }

    #[test]
    fn ranks_by_return_with_ties_in_grid_order() {
        let result = engine().run(&spec(), date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        let order: Vec<usize> = result
            .rank(RankMetric::TotalReturn)
            .iter()
            .map(|e| e.combination.index)
            .collect();
        // (1,2) holds rising SPY; (0,1) and (0,2) are flat and tie at 0
        assert_eq!(order, vec![5, 1, 2]);
        assert_eq!(result.best(RankMetric::TotalReturn).unwrap().combination.index, 5);
    }

    #[test]
    fn repeated_sweeps_rank_identically() {
        let first = engine().run(&spec(), date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        let second = ParameterSweepEngine::new(manager(
            market(),
            continuous_config(date(2020, 1, 1), date(2020, 1, 10)),
        ))
        .with_threads(1)
        .run(&spec(), date(2020, 1, 1), date(2020, 1, 10))
        .unwrap();

        for metric in [RankMetric::TotalReturn, RankMetric::MaxDrawdown] {
            let a: Vec<(usize, u64)> = first
                .rank(metric)
                .iter()
                .map(|e| (e.combination.index, metric.value(e.status.metrics().unwrap()).to_bits()))
                .collect();
            let b: Vec<(usize, u64)> = second
                .rank(metric)
                .iter()
                .map(|e| (e.combination.index, metric.value(e.status.metrics().unwrap()).to_bits()))
                .collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn uncovered_ticker_fails_every_combination_but_the_sweep_completes() {
        // ma_switch defaults need QQQ, which is not loaded
        let spec = SweepSpec::new(
            "ma_switch",
            vec![ParameterSpec::new("seed", 100.0, 200.0, 2).unwrap()],
            vec![],
        );
        let result = engine().run(&spec, date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.failures().len(), 2);
        assert!(result.rank(RankMetric::TotalReturn).is_empty());
    }
}
