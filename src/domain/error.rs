//! Domain error types.
//!
//! Load-time data-shape problems ([`SeriesError`]) abort a run before it
//! starts. Lookup problems ([`LookupError`], [`IndicatorError`]) surface inside
//! a simulation step and fail only that backtest. [`PitError`] is the
//! top-level error every public operation returns.

use chrono::NaiveDate;

/// Bad input data detected while building a series.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("series {ticker} is empty")]
    EmptySeries { ticker: String },

    #[error("series {ticker} is not strictly chronological at index {index}: {previous} followed by {date}")]
    UnsortedData {
        ticker: String,
        index: usize,
        previous: NaiveDate,
        date: NaiveDate,
    },
}

/// A point-in-time lookup that could not be answered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error(
        "stale data for {ticker} on {date}: latest value is from {last_date} ({age_days} days old, limit {max_staleness_days})"
    )]
    StaleData {
        ticker: String,
        date: NaiveDate,
        last_date: NaiveDate,
        age_days: i64,
        max_staleness_days: u32,
    },

    #[error("no data for {ticker} on or before {date}")]
    NoDataBeforeDate { ticker: String, date: NaiveDate },

    #[error("unknown ticker {ticker}")]
    UnknownTicker { ticker: String },

    #[error("lookup of {ticker} on {requested} is after the simulation date {current}")]
    FutureDate {
        ticker: String,
        requested: NaiveDate,
        current: NaiveDate,
    },
}

impl LookupError {
    pub fn ticker(&self) -> &str {
        match self {
            LookupError::StaleData { ticker, .. }
            | LookupError::NoDataBeforeDate { ticker, .. }
            | LookupError::UnknownTicker { ticker }
            | LookupError::FutureDate { ticker, .. } => ticker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error(
        "insufficient window for {indicator}({window_days}d) on {ticker} at {as_of}: {points} points, need {minimum}"
    )]
    InsufficientWindow {
        indicator: String,
        ticker: String,
        as_of: NaiveDate,
        window_days: u32,
        points: usize,
        minimum: usize,
    },

    #[error("unknown indicator {name}")]
    UnknownIndicator { name: String },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Top-level error type for pitsweep.
#[derive(Debug, thiserror::Error)]
pub enum PitError {
    #[error("invalid date range {start} to {end}: {reason}")]
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("unknown strategy: {id}")]
    UnknownStrategy { id: String },

    #[error("invalid parameter combination reached execution: {reason}")]
    InvalidCombination { reason: String },

    #[error("invalid parameter {path}: {reason}")]
    InvalidParameter { path: String, reason: String },

    #[error("series {ticker} ({first} to {last}) does not cover {start} to {end}")]
    UncoveredSeries {
        ticker: String,
        first: NaiveDate,
        last: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("sweep spec parse error in {file}: {reason}")]
    SpecParse { file: String, reason: String },

    #[error("invalid sweep spec: {reason}")]
    SpecInvalid { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PitError {
    /// The ticker a simulation-time failure is about, if any.
    pub fn ticker(&self) -> Option<&str> {
        match self {
            PitError::Lookup(e) => Some(e.ticker()),
            PitError::Indicator(IndicatorError::Lookup(e)) => Some(e.ticker()),
            PitError::Indicator(IndicatorError::InsufficientWindow { ticker, .. }) => Some(ticker),
            PitError::UncoveredSeries { ticker, .. } => Some(ticker),
            PitError::Series(SeriesError::EmptySeries { ticker })
            | PitError::Series(SeriesError::UnsortedData { ticker, .. }) => Some(ticker),
            _ => None,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            PitError::Io(_) => 1,
            PitError::ConfigParse { .. }
            | PitError::ConfigMissing { .. }
            | PitError::ConfigInvalid { .. } => 2,
            PitError::Series(_) | PitError::Data { .. } | PitError::UncoveredSeries { .. } => 3,
            PitError::SpecParse { .. }
            | PitError::SpecInvalid { .. }
            | PitError::UnknownStrategy { .. }
            | PitError::InvalidParameter { .. }
            | PitError::InvalidCombination { .. } => 4,
            PitError::InvalidRange { .. } | PitError::Lookup(_) | PitError::Indicator(_) => 5,
        }
    }

    pub fn invalid_param(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PitError::InvalidParameter {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<&PitError> for std::process::ExitCode {
    fn from(err: &PitError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}
