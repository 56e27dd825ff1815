//! Backtest engine and simulation loop.
//!
//! A run moves `Initialized → Running → Completed | Failed`. Initialization
//! builds the trading calendar and checks that every ticker the strategy needs
//! is loaded and covers the range. Running steps the strategy once per trading
//! date, values its holdings, and logs each change of allocation or mode. The
//! first lookup failure stops the run; the failure keeps everything simulated
//! up to the day before.

use crate::domain::calendar::{CalendarKind, Frequency, TradingCalendar};
use crate::domain::error::PitError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::lookup::Lookup;
use crate::domain::market_data::MarketData;
use crate::domain::metrics::{self, Metrics};
use crate::domain::params::ParamTree;
use crate::domain::strategy::{Allocation, Strategy, StrategyState};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STALENESS_DAYS: u32 = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_staleness_days: u32,
    pub calendar: CalendarKind,
    pub frequency: Frequency,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            max_staleness_days: DEFAULT_MAX_STALENESS_DAYS,
            calendar: CalendarKind::default(),
            frequency: Frequency::default(),
            risk_free_rate: 0.0,
        }
    }

    /// Same settings over a different date range.
    pub fn with_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            ..self.clone()
        }
    }

    pub fn build_calendar(&self) -> Result<TradingCalendar, PitError> {
        let source = self.calendar.source();
        match self.frequency {
            Frequency::Daily => TradingCalendar::build(self.start_date, self.end_date, source),
            Frequency::Monthly => TradingCalendar::build_monthly(self.start_date, self.end_date, source),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceEntry {
    pub date: NaiveDate,
    pub mode: String,
    pub allocation: Allocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestPeriod {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub params: ParamTree,
    /// Trading dates simulated; `portfolio_values[i]` is the value on `date_range[i]`.
    pub date_range: Vec<NaiveDate>,
    pub portfolio_values: Vec<f64>,
    pub rebalancing_log: Vec<RebalanceEntry>,
}

impl BacktestResult {
    pub fn empty(strategy_id: impl Into<String>, params: ParamTree) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            params,
            date_range: Vec::new(),
            portfolio_values: Vec::new(),
            rebalancing_log: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.portfolio_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolio_values.is_empty()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.portfolio_values.last().copied()
    }

    pub fn total_return(&self) -> f64 {
        metrics::total_return(&self.portfolio_values)
    }

    pub fn max_drawdown(&self) -> f64 {
        metrics::max_drawdown(&self.portfolio_values)
    }

    pub fn metrics(&self, risk_free_rate: f64) -> Metrics {
        Metrics::compute(&self.portfolio_values, risk_free_rate)
    }

    /// Values rescaled so the first one is 100.
    pub fn normalized(&self) -> Vec<f64> {
        match self.portfolio_values.first() {
            Some(&first) if first != 0.0 => self
                .portfolio_values
                .iter()
                .map(|v| v / first * 100.0)
                .collect(),
            _ => self.portfolio_values.clone(),
        }
    }

    /// The part of this run that falls inside `[start, end]`.
    pub fn extract_period(&self, start: NaiveDate, end: NaiveDate) -> Result<Self, PitError> {
        let lo = self.date_range.partition_point(|d| *d < start);
        let hi = self.date_range.partition_point(|d| *d <= end);
        if start > end || lo >= hi {
            return Err(PitError::InvalidRange {
                start,
                end,
                reason: format!("no simulated dates of {} in period", self.strategy_id),
            });
        }
        Ok(Self {
            strategy_id: self.strategy_id.clone(),
            params: self.params.clone(),
            date_range: self.date_range[lo..hi].to_vec(),
            portfolio_values: self.portfolio_values[lo..hi].to_vec(),
            rebalancing_log: self
                .rebalancing_log
                .iter()
                .filter(|e| e.date >= start && e.date <= end)
                .cloned()
                .collect(),
        })
    }
}

/// A run that stopped before the end of its calendar.
#[derive(Debug, thiserror::Error)]
#[error("backtest of {strategy_id} failed: {error}")]
pub struct BacktestFailure {
    pub strategy_id: String,
    #[source]
    pub error: PitError,
    /// Date of the step that failed; `None` when the run failed to initialize.
    pub date: Option<NaiveDate>,
    pub partial: BacktestResult,
}

impl BacktestFailure {
    pub fn before_start(strategy_id: &str, params: &ParamTree, error: PitError) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            error,
            date: None,
            partial: BacktestResult::empty(strategy_id, params.clone()),
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        self.error.ticker()
    }
}

pub struct BacktestEngine<'a> {
    config: &'a BacktestConfig,
    market: &'a MarketData,
    indicators: &'a IndicatorEngine,
    state: RunState,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(config: &'a BacktestConfig, market: &'a MarketData, indicators: &'a IndicatorEngine) -> Self {
        Self {
            config,
            market,
            indicators,
            state: RunState::Initialized,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn prepare(&self, strategy: &dyn Strategy, params: &ParamTree) -> Result<TradingCalendar, PitError> {
        let calendar = self.config.build_calendar()?;
        let (first, last) = match (calendar.first(), calendar.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(PitError::InvalidRange {
                    start: self.config.start_date,
                    end: self.config.end_date,
                    reason: "empty trading calendar".into(),
                });
            }
        };
        for ticker in strategy.required_tickers(params)? {
            self.market
                .check_coverage(&ticker, first, last, self.config.max_staleness_days)?;
        }
        debug!(
            strategy = strategy.id(),
            dates = calendar.len(),
            calendar = %self.config.calendar,
            "calendar built"
        );
        Ok(calendar)
    }

    pub fn run(
        &mut self,
        strategy: &dyn Strategy,
        params: &ParamTree,
    ) -> Result<BacktestResult, BacktestFailure> {
        self.state = RunState::Initialized;
        let calendar = match self.prepare(strategy, params) {
            Ok(calendar) => calendar,
            Err(error) => {
                self.state = RunState::Failed;
                warn!(strategy = strategy.id(), error = %error, "backtest failed to initialize");
                return Err(BacktestFailure::before_start(strategy.id(), params, error));
            }
        };

        self.state = RunState::Running;
        info!(
            strategy = strategy.id(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            dates = calendar.len(),
            "backtest started"
        );

        let mut result = BacktestResult::empty(strategy.id(), params.clone());
        result.date_range.reserve(calendar.len());
        result.portfolio_values.reserve(calendar.len());
        let mut prior = StrategyState::default();

        for &date in calendar.dates() {
            let lookup = Lookup::new(date, self.market, self.indicators, self.config.max_staleness_days);
            let step = strategy
                .step(date, &lookup, params, &prior)
                .and_then(|next| next.allocation.value(&lookup).map(|value| (next, value)));

            let (next, value) = match step {
                Ok(step) => step,
                Err(error) => {
                    self.state = RunState::Failed;
                    warn!(
                        strategy = strategy.id(),
                        date = %date,
                        ticker = error.ticker().unwrap_or("-"),
                        error = %error,
                        "backtest failed"
                    );
                    return Err(BacktestFailure {
                        strategy_id: strategy.id().to_string(),
                        error,
                        date: Some(date),
                        partial: result,
                    });
                }
            };

            if next.allocation != prior.allocation || next.mode != prior.mode {
                result.rebalancing_log.push(RebalanceEntry {
                    date,
                    mode: next.mode.clone(),
                    allocation: next.allocation.clone(),
                });
            }
            result.date_range.push(date);
            result.portfolio_values.push(value);
            prior = next;
        }

        self.state = RunState::Completed;
        info!(
            strategy = strategy.id(),
            total_return = result.total_return(),
            rebalances = result.rebalancing_log.len(),
            "backtest completed"
        );
        Ok(result)
    }
}
