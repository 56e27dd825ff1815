//! The loaded set of series a simulation reads from.
//!
//! Tickers can be redirected: a lookup for `TQQQ` may be served by a longer,
//! extended `ext_TQQQ` series while strategies keep using the short name.

use crate::domain::error::{LookupError, PitError};
use crate::domain::series::PointInTimeSeries;
use crate::ports::data_port::DataPort;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const EXTENDED_PREFIX: &str = "ext_";

#[derive(Debug, Clone, Default)]
pub struct MarketData {
    series: HashMap<String, PointInTimeSeries>,
    redirects: BTreeMap<String, String>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-loaded series; a ticker may appear only once.
    pub fn from_series(
        series: impl IntoIterator<Item = PointInTimeSeries>,
    ) -> Result<Self, PitError> {
        let mut data = Self::new();
        for s in series {
            data.insert(s)?;
        }
        Ok(data)
    }

    /// Load every ticker the data port knows about.
    pub fn load_all(port: &dyn DataPort) -> Result<Self, PitError> {
        let tickers = port.list_tickers()?;
        let mut data = Self::new();
        for ticker in &tickers {
            let series = port.load_series(ticker)?;
            debug!(
                ticker = %ticker,
                points = series.len(),
                frequency = %series.frequency(),
                "loaded series"
            );
            data.insert(series)?;
        }
        info!(count = data.len(), "market data loaded");
        Ok(data)
    }

    pub fn insert(&mut self, series: PointInTimeSeries) -> Result<(), PitError> {
        let ticker = series.ticker().to_string();
        if self.series.contains_key(&ticker) {
            return Err(PitError::Data {
                reason: format!("duplicate series for ticker {ticker}"),
            });
        }
        self.series.insert(ticker, series);
        Ok(())
    }

    /// Serve lookups for `from` with the series loaded as `to`.
    pub fn redirect(&mut self, from: impl Into<String>, to: impl Into<String>) -> Result<(), PitError> {
        let from = from.into();
        let to = to.into();
        if !self.series.contains_key(&to) {
            return Err(PitError::Data {
                reason: format!("redirect {from} -> {to}: target series is not loaded"),
            });
        }
        info!(from = %from, to = %to, "ticker redirected");
        self.redirects.insert(from, to);
        Ok(())
    }

    /// Redirect every `X` with a loaded `ext_X` series to it, unless `X` is
    /// already redirected. Returns the number of redirects installed.
    pub fn prefer_extended(&mut self) -> usize {
        let mut extended: Vec<&String> = self
            .series
            .keys()
            .filter(|t| t.len() > EXTENDED_PREFIX.len() && t.starts_with(EXTENDED_PREFIX))
            .collect();
        extended.sort_unstable();

        let mut installed = 0;
        for ext in extended {
            let base = &ext[EXTENDED_PREFIX.len()..];
            if self.redirects.contains_key(base) {
                continue;
            }
            debug!(from = %base, to = %ext, "preferring extended series");
            self.redirects.insert(base.to_string(), ext.clone());
            installed += 1;
        }
        if installed > 0 {
            info!(count = installed, "extended series preferred");
        }
        installed
    }

    pub fn redirects(&self) -> &BTreeMap<String, String> {
        &self.redirects
    }

    fn resolve<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.redirects.get(ticker).map(String::as_str).unwrap_or(ticker)
    }

    pub fn get(&self, ticker: &str) -> Result<&PointInTimeSeries, LookupError> {
        self.series
            .get(self.resolve(ticker))
            .ok_or_else(|| LookupError::UnknownTicker {
                ticker: ticker.to_string(),
            })
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.series.contains_key(self.resolve(ticker))
    }

    /// Loaded tickers, sorted.
    pub fn tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.series.keys().map(String::as_str).collect();
        tickers.sort_unstable();
        tickers
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// A series covers `[start, end]` when it has a value on or before `start`
    /// and its last value is still fresh at `end`.
    pub fn check_coverage(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        max_staleness_days: u32,
    ) -> Result<(), PitError> {
        let series = self.get(ticker)?;
        let first = series.first_date();
        let last = series.last_date();
        let fresh_until = last
            .checked_add_signed(Duration::days(i64::from(max_staleness_days)))
            .unwrap_or(NaiveDate::MAX);

        if first > start || fresh_until < end {
            return Err(PitError::UncoveredSeries {
                ticker: ticker.to_string(),
                first,
                last,
                start,
                end,
            });
        }
        Ok(())
    }
}
