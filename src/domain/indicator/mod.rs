//! Windowed technical indicators.
//!
//! - `Transform`: a named reduction over the values in a window, with the
//!   minimum number of points it needs
//! - `IndicatorEngine`: the registered-transform table plus a result cache
//!   keyed by `(ticker, indicator, as_of, window_days)`
//! - `IndicatorResult`: one computed scalar
//!
//! Series never change after load, so a cached result stays valid for the
//! life of the engine. The cache is a concurrent map: parallel sweep runs may
//! race on first access, and the loser's recomputation is simply dropped.

pub mod ema;
pub mod extremes;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;

use crate::domain::error::IndicatorError;
use crate::domain::series::PointInTimeSeries;
use chrono::{Duration, NaiveDate};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;

pub type TransformFn = fn(&[f64]) -> f64;

#[derive(Clone, Copy)]
pub struct Transform {
    pub min_points: usize,
    pub apply: TransformFn,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("min_points", &self.min_points)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorKey {
    pub ticker: String,
    pub indicator: String,
    pub as_of: NaiveDate,
    pub window_days: u32,
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}d) {} @ {}",
            self.indicator.to_uppercase(),
            self.window_days,
            self.ticker,
            self.as_of
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorResult {
    pub key: IndicatorKey,
    /// Number of series points inside the window.
    pub points: usize,
    pub value: f64,
}

#[derive(Debug)]
pub struct IndicatorEngine {
    transforms: HashMap<String, Transform>,
    cache: DashMap<IndicatorKey, IndicatorResult>,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    /// Engine with the built-in transforms registered.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        engine.register("sma", sma::TRANSFORM);
        engine.register("stddev", stddev::STDDEV);
        engine.register("volatility", stddev::VOLATILITY);
        engine.register("roc", roc::TRANSFORM);
        engine.register("rsi", rsi::TRANSFORM);
        engine.register("max", extremes::MAX);
        engine.register("min", extremes::MIN);
        engine.register("ema", ema::TRANSFORM);
        engine.register("macd", macd::LINE);
        engine.register("macd_signal", macd::SIGNAL_LINE);
        engine
    }

    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Register (or replace) a transform. Names are case-insensitive.
    pub fn register(&mut self, name: &str, transform: Transform) {
        self.transforms.insert(name.to_lowercase(), transform);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Apply `indicator` to the values of `series` in `[as_of - window_days, as_of]`.
    ///
    /// `ticker` is the name the caller asked for; it keys the cache and need not
    /// equal `series.ticker()` when the ticker is redirected.
    pub fn compute(
        &self,
        indicator: &str,
        ticker: &str,
        as_of: NaiveDate,
        window_days: u32,
        series: &PointInTimeSeries,
    ) -> Result<IndicatorResult, IndicatorError> {
        let indicator = indicator.to_lowercase();
        let key = IndicatorKey {
            ticker: ticker.to_string(),
            indicator,
            as_of,
            window_days,
        };

        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let transform = self
            .transforms
            .get(&key.indicator)
            .ok_or_else(|| IndicatorError::UnknownIndicator {
                name: key.indicator.clone(),
            })?;

        let window_start = as_of
            .checked_sub_signed(Duration::days(i64::from(window_days)))
            .unwrap_or(NaiveDate::MIN);
        let values = series.window(window_start, as_of);

        if values.len() < transform.min_points.max(1) {
            return Err(IndicatorError::InsufficientWindow {
                indicator: key.indicator,
                ticker: key.ticker,
                as_of,
                window_days,
                points: values.len(),
                minimum: transform.min_points.max(1),
            });
        }

        let result = IndicatorResult {
            points: values.len(),
            value: (transform.apply)(values),
            key: key.clone(),
        };

        Ok(self.cache.entry(key).or_insert(result).value().clone())
    }
}
