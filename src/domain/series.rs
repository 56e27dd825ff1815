//! Point-in-time series.
//!
//! A series stores values exactly as sampled. Nothing is forward-filled or
//! interpolated at load time: a monthly series queried on a daily trading date
//! resolves to the latest month-start value, and whether that value is still
//! usable is decided per call by the caller's staleness bound.

use crate::domain::calendar::Frequency;
use crate::domain::error::{LookupError, SeriesError};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PointInTimeSeries {
    ticker: String,
    frequency: Frequency,
    source: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl PointInTimeSeries {
    /// Build a series from raw `(date, value)` pairs that must already be in
    /// strictly increasing date order.
    pub fn load(
        ticker: impl Into<String>,
        raw: Vec<(NaiveDate, f64)>,
        frequency: Frequency,
        source: impl Into<String>,
    ) -> Result<Self, SeriesError> {
        let ticker = ticker.into();
        if raw.is_empty() {
            return Err(SeriesError::EmptySeries { ticker });
        }

        if let Some(index) = raw.windows(2).position(|w| w[0].0 >= w[1].0) {
            return Err(SeriesError::UnsortedData {
                ticker,
                index: index + 1,
                previous: raw[index].0,
                date: raw[index + 1].0,
            });
        }

        let (dates, values) = raw.into_iter().unzip();
        Ok(Self {
            ticker,
            frequency,
            source: source.into(),
            dates,
            values,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Latest entry at or before `date`, ignoring staleness.
    pub fn latest_at(&self, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        let idx = self.dates.partition_point(|d| *d <= date);
        if idx == 0 {
            None
        } else {
            Some((self.dates[idx - 1], self.values[idx - 1]))
        }
    }

    /// Most recent value at or before `date` no older than `max_staleness_days`.
    pub fn value_at(&self, date: NaiveDate, max_staleness_days: u32) -> Result<f64, LookupError> {
        let (last_date, value) =
            self.latest_at(date)
                .ok_or_else(|| LookupError::NoDataBeforeDate {
                    ticker: self.ticker.clone(),
                    date,
                })?;

        let age_days = (date - last_date).num_days();
        if age_days > i64::from(max_staleness_days) {
            return Err(LookupError::StaleData {
                ticker: self.ticker.clone(),
                date,
                last_date,
                age_days,
                max_staleness_days,
            });
        }
        Ok(value)
    }

    /// Values with `start <= date <= end`, in date order.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> &[f64] {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi { &[] } else { &self.values[lo..hi] }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}
