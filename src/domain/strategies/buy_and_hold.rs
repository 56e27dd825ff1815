//! Buy `seed / price` units of one ticker on the first day and hold them.

use crate::domain::error::PitError;
use crate::domain::lookup::Lookup;
use crate::domain::params::{ParamTree, require_f64, require_str};
use crate::domain::strategy::{Allocation, CASH, Strategy, StrategyState};
use chrono::NaiveDate;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl Strategy for BuyAndHold {
    fn id(&self) -> &str {
        "buy_and_hold"
    }

    fn description(&self) -> &str {
        "Invest the seed in one ticker on the first date and never rebalance"
    }

    fn default_params(&self) -> ParamTree {
        json!({"ticker": "SPY", "seed": 10000.0})
    }

    fn required_tickers(&self, params: &ParamTree) -> Result<Vec<String>, PitError> {
        let ticker = require_str(params, &["ticker"])?;
        if ticker == CASH {
            return Ok(Vec::new());
        }
        Ok(vec![ticker.to_string()])
    }

    fn step(
        &self,
        _date: NaiveDate,
        lookup: &Lookup<'_>,
        params: &ParamTree,
        prior: &StrategyState,
    ) -> Result<StrategyState, PitError> {
        if !prior.is_initial() {
            return Ok(prior.clone());
        }
        let ticker = require_str(params, &["ticker"])?;
        let seed = require_f64(params, &["seed"])?;
        let price = lookup.value(ticker)?;
        if price <= 0.0 {
            return Err(PitError::invalid_param(
                "ticker",
                format!("{ticker} has non-positive price {price} on {}", lookup.date()),
            ));
        }
        Ok(StrategyState::new(Allocation::single(ticker, seed / price), "hold"))
    }
}
