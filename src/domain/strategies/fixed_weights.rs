//! Hold a fixed number of units per ticker on every date.
//!
//! Overrides merge into the default weights key by key, so a ticker is
//! dropped from the holding by setting its units to 0.

use crate::domain::error::PitError;
use crate::domain::lookup::Lookup;
use crate::domain::params::{ParamTree, require_object};
use crate::domain::strategy::{Allocation, CASH, Strategy, StrategyState};
use chrono::NaiveDate;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWeights;

fn weights(params: &ParamTree) -> Result<Allocation, PitError> {
    let mut held = Vec::new();
    for (ticker, w) in require_object(params, &["weights"])? {
        let units = w
            .as_f64()
            .ok_or_else(|| PitError::invalid_param(format!("weights.{ticker}"), "expected a number"))?;
        if units != 0.0 {
            held.push((ticker.clone(), units));
        }
    }
    Ok(held.into_iter().collect())
}

impl Strategy for FixedWeights {
    fn id(&self) -> &str {
        "fixed_weights"
    }

    fn description(&self) -> &str {
        "Hold the configured units of each ticker on every date"
    }

    fn default_params(&self) -> ParamTree {
        json!({"weights": {"SPY": 0.6, "AGG": 0.4}})
    }

    fn required_tickers(&self, params: &ParamTree) -> Result<Vec<String>, PitError> {
        Ok(weights(params)?
            .iter()
            .filter(|(t, _)| *t != CASH)
            .map(|(t, _)| t.to_string())
            .collect())
    }

    fn step(
        &self,
        _date: NaiveDate,
        _lookup: &Lookup<'_>,
        params: &ParamTree,
        _prior: &StrategyState,
    ) -> Result<StrategyState, PitError> {
        Ok(StrategyState::new(weights(params)?, "fixed"))
    }
}
