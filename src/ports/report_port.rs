//! Report output port trait.

use crate::domain::backtest::{BacktestResult, TestPeriod};
use crate::domain::error::PitError;
use crate::domain::sweep::{RankMetric, SweepResult};
use std::path::Path;

/// Port for writing run results.
pub trait ReportPort {
    /// Write one backtest (value path and rebalancing log) plus its sub-period summaries.
    fn write_backtest(
        &self,
        result: &BacktestResult,
        periods: &[TestPeriod],
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), PitError>;

    /// Write every entry of a sweep, ranked by `metric`, and a summary. Each
    /// completed entry also gets its return and drawdown inside every period.
    fn write_sweep(
        &self,
        result: &SweepResult,
        metric: RankMetric,
        periods: &[TestPeriod],
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), PitError>;
}
