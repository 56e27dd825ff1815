//! Resolves strategy ids, merges parameter overrides over defaults, and runs
//! one backtest per request against shared market data.

use crate::domain::backtest::{BacktestConfig, BacktestEngine, BacktestFailure, BacktestResult};
use crate::domain::error::PitError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::market_data::MarketData;
use crate::domain::params::{self, ParamTree};
use crate::domain::strategy::{Strategy, StrategyRegistry};
use chrono::NaiveDate;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StrategyManager {
    registry: Arc<StrategyRegistry>,
    market: Arc<MarketData>,
    indicators: Arc<IndicatorEngine>,
    config: BacktestConfig,
}

impl StrategyManager {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        market: Arc<MarketData>,
        indicators: Arc<IndicatorEngine>,
        config: BacktestConfig,
    ) -> Self {
        Self {
            registry,
            market,
            indicators,
            config,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn market(&self) -> &MarketData {
        &self.market
    }

    pub fn indicators(&self) -> &IndicatorEngine {
        &self.indicators
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn resolve(&self, strategy_id: &str) -> Result<Arc<dyn Strategy>, PitError> {
        self.registry.get(strategy_id)
    }

    /// Strategy defaults with `overrides` deep-merged on top.
    pub fn merged_params(&self, strategy: &dyn Strategy, overrides: &ParamTree) -> ParamTree {
        params::merge(&strategy.default_params(), overrides)
    }

    pub fn execute(
        &self,
        strategy_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        overrides: &ParamTree,
    ) -> Result<BacktestResult, BacktestFailure> {
        let strategy = self
            .resolve(strategy_id)
            .map_err(|e| BacktestFailure::before_start(strategy_id, overrides, e))?;
        let merged = self.merged_params(strategy.as_ref(), overrides);
        self.run_merged(strategy.as_ref(), start, end, &merged)
    }

    /// Run with an already-merged parameter tree.
    pub fn run_merged(
        &self,
        strategy: &dyn Strategy,
        start: NaiveDate,
        end: NaiveDate,
        merged: &ParamTree,
    ) -> Result<BacktestResult, BacktestFailure> {
        let config = self.config.with_range(start, end);
        BacktestEngine::new(&config, &self.market, &self.indicators).run(strategy, merged)
    }
}
