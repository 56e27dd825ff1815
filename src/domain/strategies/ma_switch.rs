//! Moving-average switch with hysteresis.
//!
//! The signal ticker is compared to its SMA over `window_days`. From risk-off
//! the strategy goes risk-on once `price > enter × SMA`; from risk-on it goes
//! risk-off once `price < exit × SMA`. On every switch the whole portfolio
//! value moves into the chosen ticker. Until the SMA window has enough points
//! the portfolio sits in `risk_off`.

use crate::domain::error::{IndicatorError, PitError};
use crate::domain::lookup::Lookup;
use crate::domain::params::{ParamTree, require_days, require_f64, require_str};
use crate::domain::strategy::{Allocation, CASH, Strategy, StrategyState};
use chrono::NaiveDate;
use serde_json::json;
use tracing::debug;

pub const RISK_ON: &str = "risk_on";
pub const RISK_OFF: &str = "risk_off";

#[derive(Debug, Clone, Copy, Default)]
pub struct MaSwitch;

struct Params<'a> {
    signal: &'a str,
    risk_on: &'a str,
    risk_off: &'a str,
    window_days: u32,
    seed: f64,
    exit: f64,
    enter: f64,
}

impl<'a> Params<'a> {
    fn read(params: &'a ParamTree) -> Result<Self, PitError> {
        let p = Self {
            signal: require_str(params, &["signal"])?,
            risk_on: require_str(params, &["risk_on"])?,
            risk_off: require_str(params, &["risk_off"])?,
            window_days: require_days(params, &["window_days"])?,
            seed: require_f64(params, &["seed"])?,
            exit: require_f64(params, &["thresholds", "exit"])?,
            enter: require_f64(params, &["thresholds", "enter"])?,
        };
        if p.exit > p.enter {
            return Err(PitError::invalid_param(
                "thresholds",
                format!("exit {} is above enter {}", p.exit, p.enter),
            ));
        }
        Ok(p)
    }

    fn target(&self, mode: &str) -> &'a str {
        if mode == RISK_ON { self.risk_on } else { self.risk_off }
    }
}

impl Strategy for MaSwitch {
    fn id(&self) -> &str {
        "ma_switch"
    }

    fn description(&self) -> &str {
        "Switch between a risk-on and a risk-off ticker on the signal's SMA, with hysteresis"
    }

    fn default_params(&self) -> ParamTree {
        json!({
            "signal": "SPY",
            "risk_on": "QQQ",
            "risk_off": "CASH",
            "window_days": 200,
            "seed": 10000.0,
            "thresholds": {"exit": 0.97, "enter": 1.03}
        })
    }

    fn required_tickers(&self, params: &ParamTree) -> Result<Vec<String>, PitError> {
        let p = Params::read(params)?;
        let mut tickers: Vec<String> = [p.signal, p.risk_on, p.risk_off]
            .into_iter()
            .filter(|t| *t != CASH)
            .map(str::to_string)
            .collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    fn step(
        &self,
        date: NaiveDate,
        lookup: &Lookup<'_>,
        params: &ParamTree,
        prior: &StrategyState,
    ) -> Result<StrategyState, PitError> {
        let p = Params::read(params)?;
        let price = lookup.value(p.signal)?;

        let sma = match lookup.indicator("sma", p.signal, p.window_days) {
            Ok(v) => Some(v),
            Err(PitError::Indicator(IndicatorError::InsufficientWindow { .. })) => None,
            Err(e) => return Err(e),
        };

        let mode = match (prior.mode.as_str(), sma) {
            (RISK_ON, Some(sma)) if price < p.exit * sma => RISK_OFF,
            (RISK_OFF, Some(sma)) if price > p.enter * sma => RISK_ON,
            (RISK_ON, _) => RISK_ON,
            (RISK_OFF, _) => RISK_OFF,
            (_, Some(sma)) if price >= sma => RISK_ON,
            _ => RISK_OFF,
        };

        let allocation = if prior.is_initial() || prior.mode != mode {
            let worth = if prior.is_initial() {
                p.seed
            } else {
                prior.allocation.value(lookup)?
            };
            let target = p.target(mode);
            let target_price = lookup.value(target)?;
            if target_price <= 0.0 {
                return Err(PitError::invalid_param(
                    mode,
                    format!("{target} has non-positive price {target_price} on {date}"),
                ));
            }
            debug!(date = %date, from = %prior.mode, to = mode, worth, "ma_switch rebalance");
            Allocation::single(target, worth / target_price)
        } else {
            prior.allocation.clone()
        };

        let mut state = StrategyState::new(allocation, mode);
        state.vars.insert("signal".into(), price);
        if let Some(sma) = sma {
            state.vars.insert("sma".into(), sma);
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorEngine;
    use crate::domain::market_data::MarketData;
    use crate::domain::strategies::testing::{daily, date, market};

    fn params(window_days: u32) -> ParamTree {
        json!({
            "signal": "SIG",
            "risk_on": "SIG",
            "risk_off": "CASH",
            "window_days": window_days,
            "seed": 100.0,
            "thresholds": {"exit": 0.95, "enter": 1.05}
        })
    }

    fn run(market: &MarketData, params: &ParamTree, days: u32) -> Vec<StrategyState> {
        let engine = IndicatorEngine::new();
        let mut state = StrategyState::default();
        let mut out = Vec::new();
        for day in 1..=days {
            let d = date(2020, 1, day);
            let lookup = Lookup::new(d, market, &engine, 0);
            state = MaSwitch.step(d, &lookup, params, &state).unwrap();
            out.push(state.clone());
        }
        out
    }

    #[test]
    fn flat_series_starts_and_stays_risk_on() {
        let market = market(vec![daily("SIG", &[100.0; 5])]);
        let states = run(&market, &params(2), 5);
        // price == sma on day one
        assert_eq!(states[0].mode, RISK_ON);
        assert!(states.iter().all(|s| s.mode == RISK_ON));
        assert!((states[0].allocation.get("SIG").unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hysteresis_switches() {
        // rise, then a sharp drop, then recovery
        let values = [100.0, 100.0, 100.0, 80.0, 80.0, 80.0, 80.0, 100.0, 100.0];
        let market = market(vec![daily("SIG", &values)]);
        let states = run(&market, &params(2), 9);
        let modes: Vec<&str> = states.iter().map(|s| s.mode.as_str()).collect();
        // day 4: 80 < 0.95 * sma(100,100,80) = 88.7 -> off
        // day 8: 100 > 1.05 * sma(80,80,100) = 91.0 -> on
        assert_eq!(
            modes,
            vec![RISK_ON, RISK_ON, RISK_ON, RISK_OFF, RISK_OFF, RISK_OFF, RISK_OFF, RISK_ON, RISK_ON]
        );
        // switched out at 80 with 1 unit -> 80 cash; back in at 100 -> 0.8 units
        assert!((states[3].allocation.get(CASH).unwrap() - 80.0).abs() < 1e-9);
        assert!((states[7].allocation.get("SIG").unwrap() - 0.8).abs() < 1e-9);
        assert!(states[7].vars.contains_key("sma"));
    }

    #[test]
    fn stays_inside_the_band() {
        // 97 is below sma but above exit*sma, so risk-on holds
        let values = [100.0, 100.0, 97.0, 97.0];
        let market = market(vec![daily("SIG", &values)]);
        let states = run(&market, &params(3), 4);
        assert!(states.iter().all(|s| s.mode == RISK_ON));
    }

    #[test]
    fn insufficient_window_falls_back_to_risk_off() {
        let mut engine = IndicatorEngine::empty();
        engine.register(
            "sma",
            crate::domain::indicator::Transform {
                min_points: 3,
                apply: crate::domain::indicator::sma::mean,
            },
        );
        let market = market(vec![daily("SIG", &[100.0, 100.0, 100.0])]);
        let p = params(10);
        let lookup = Lookup::new(date(2020, 1, 1), &market, &engine, 0);
        let state = MaSwitch
            .step(date(2020, 1, 1), &lookup, &p, &StrategyState::default())
            .unwrap();
        assert_eq!(state.mode, RISK_OFF);
        assert!((state.allocation.get(CASH).unwrap() - 100.0).abs() < f64::EPSILON);
        assert!(!state.vars.contains_key("sma"));
    }

    #[test]
    fn required_tickers_skip_cash_and_dedupe() {
        assert_eq!(MaSwitch.required_tickers(&params(5)).unwrap(), vec!["SIG"]);
        assert_eq!(
            MaSwitch.required_tickers(&MaSwitch.default_params()).unwrap(),
            vec!["QQQ", "SPY"]
        );
    }

    #[test]
    fn exit_above_enter_is_rejected() {
        let mut p = params(5);
        p["thresholds"]["exit"] = json!(1.2);
        assert!(matches!(
            MaSwitch.required_tickers(&p),
            Err(PitError::InvalidParameter { .. })
        ));
    }
}
