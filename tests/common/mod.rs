#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use pitsweep::adapters::file_config_adapter::FileConfigAdapter;
use pitsweep::domain::backtest::BacktestConfig;
use pitsweep::domain::calendar::{CalendarKind, Frequency};
use pitsweep::domain::error::PitError;
use pitsweep::domain::indicator::IndicatorEngine;
use pitsweep::domain::market_data::MarketData;
use pitsweep::domain::series::PointInTimeSeries;
use pitsweep::domain::strategy::StrategyRegistry;
use pitsweep::domain::strategy_manager::StrategyManager;
use pitsweep::ports::data_port::DataPort;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory series source keyed by ticker.
pub struct MockDataPort {
    pub data: BTreeMap<String, (Vec<(NaiveDate, f64)>, Frequency)>,
    pub errors: BTreeMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn with_series(mut self, ticker: &str, points: Vec<(NaiveDate, f64)>) -> Self {
        self.data.insert(ticker.to_string(), (points, Frequency::Daily));
        self
    }

    pub fn with_monthly(mut self, ticker: &str, points: Vec<(NaiveDate, f64)>) -> Self {
        self.data.insert(ticker.to_string(), (points, Frequency::Monthly));
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn list_tickers(&self) -> Result<Vec<String>, PitError> {
        Ok(self.data.keys().chain(self.errors.keys()).cloned().collect())
    }

    fn load_series(&self, ticker: &str) -> Result<PointInTimeSeries, PitError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PitError::Data {
                reason: reason.clone(),
            });
        }
        let (points, frequency) = self.data.get(ticker).cloned().ok_or_else(|| PitError::Data {
            reason: format!("no series for {ticker}"),
        })?;
        Ok(PointInTimeSeries::load(ticker, points, frequency, "mock")?)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One point per calendar day starting at `start`.
pub fn daily(start: NaiveDate, values: &[f64]) -> Vec<(NaiveDate, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (start + Duration::days(i as i64), *v))
        .collect()
}

/// `count` daily points from `start`, beginning at `base` and moving `step` a day.
pub fn linear(start: NaiveDate, count: usize, base: f64, step: f64) -> Vec<(NaiveDate, f64)> {
    (0..count)
        .map(|i| (start + Duration::days(i as i64), base + step * i as f64))
        .collect()
}

pub fn series(ticker: &str, points: Vec<(NaiveDate, f64)>) -> PointInTimeSeries {
    PointInTimeSeries::load(ticker, points, Frequency::Daily, "test").unwrap()
}

/// A rises 1/day from 100, B holds at 50; 2020-01-01 onwards.
pub fn rising_and_flat(days: usize) -> MarketData {
    let start = date(2020, 1, 1);
    MarketData::from_series([
        series("A", linear(start, days, 100.0, 1.0)),
        series("B", linear(start, days, 50.0, 0.0)),
    ])
    .unwrap()
}

pub fn continuous_config(start: NaiveDate, end: NaiveDate) -> BacktestConfig {
    BacktestConfig {
        calendar: CalendarKind::Continuous,
        ..BacktestConfig::new(start, end)
    }
}

pub fn manager(market: MarketData, config: BacktestConfig) -> StrategyManager {
    StrategyManager::new(
        Arc::new(StrategyRegistry::with_builtins()),
        Arc::new(market),
        Arc::new(IndicatorEngine::new()),
        config,
    )
}

pub fn ini(content: &str) -> FileConfigAdapter {
    FileConfigAdapter::from_string(content).unwrap()
}
