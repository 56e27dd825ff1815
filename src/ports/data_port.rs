//! Data access port trait.

use crate::domain::error::PitError;
use crate::domain::series::PointInTimeSeries;

pub trait DataPort {
    /// Tickers this source can load, sorted.
    fn list_tickers(&self) -> Result<Vec<String>, PitError>;

    fn load_series(&self, ticker: &str) -> Result<PointInTimeSeries, PitError>;
}
