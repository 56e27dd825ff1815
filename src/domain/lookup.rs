//! The read-only view of market data a strategy gets on one simulation date.
//!
//! Every lookup is bound to the current date and the run's staleness bound,
//! so a strategy cannot see values published after the date it is deciding on.

use crate::domain::error::{IndicatorError, LookupError, PitError};
use crate::domain::indicator::IndicatorEngine;
use crate::domain::market_data::MarketData;
use crate::domain::strategy::CASH;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    date: NaiveDate,
    market: &'a MarketData,
    indicators: &'a IndicatorEngine,
    max_staleness_days: u32,
}

impl<'a> Lookup<'a> {
    pub fn new(
        date: NaiveDate,
        market: &'a MarketData,
        indicators: &'a IndicatorEngine,
        max_staleness_days: u32,
    ) -> Self {
        Self {
            date,
            market,
            indicators,
            max_staleness_days,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn max_staleness_days(&self) -> u32 {
        self.max_staleness_days
    }

    /// Value of `ticker` on the current date. `CASH` is always 1.0.
    pub fn value(&self, ticker: &str) -> Result<f64, PitError> {
        self.value_at(ticker, self.date)
    }

    /// Value of `ticker` on an earlier date; dates after the current one are refused.
    pub fn value_at(&self, ticker: &str, date: NaiveDate) -> Result<f64, PitError> {
        if date > self.date {
            return Err(LookupError::FutureDate {
                ticker: ticker.to_string(),
                requested: date,
                current: self.date,
            }
            .into());
        }
        if ticker == CASH {
            return Ok(1.0);
        }
        let series = self.market.get(ticker)?;
        Ok(series.value_at(date, self.max_staleness_days)?)
    }

    /// `indicator` over `[date - window_days, date]` of `ticker`.
    pub fn indicator(&self, indicator: &str, ticker: &str, window_days: u32) -> Result<f64, PitError> {
        self.indicator_at(indicator, ticker, window_days, self.date)
    }

    /// `indicator` as of an earlier date. The newest point feeding the window
    /// must be within the staleness bound of `as_of`, same as a plain value.
    pub fn indicator_at(
        &self,
        indicator: &str,
        ticker: &str,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<f64, PitError> {
        if as_of > self.date {
            return Err(LookupError::FutureDate {
                ticker: ticker.to_string(),
                requested: as_of,
                current: self.date,
            }
            .into());
        }
        let series = self.market.get(ticker).map_err(IndicatorError::from)?;
        series
            .value_at(as_of, self.max_staleness_days)
            .map_err(IndicatorError::from)?;
        let result = self
            .indicators
            .compute(indicator, ticker, as_of, window_days, series)?;
        Ok(result.value)
    }
}
