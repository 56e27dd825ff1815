//! MACD over the window, with the standard 12/26/9 periods.
//!
//! Line = EMA(12) - EMA(26) of the window values, read at the newest point.
//! Signal = EMA(9) of the line. The window must hold at least 26 points for
//! the line and 34 for the signal.

use crate::domain::indicator::Transform;
use crate::domain::indicator::ema::ema_path;

pub const FAST: usize = 12;
pub const SLOW: usize = 26;
pub const SIGNAL: usize = 9;

pub const LINE: Transform = Transform {
    min_points: SLOW,
    apply: macd_line,
};

pub const SIGNAL_LINE: Transform = Transform {
    min_points: SLOW + SIGNAL - 1,
    apply: macd_signal,
};

/// Line values from the first index where the slow EMA exists.
fn line_path(values: &[f64]) -> Vec<f64> {
    let fast = ema_path(values, FAST);
    let slow = ema_path(values, SLOW);
    fast.iter()
        .zip(&slow)
        .filter_map(|(f, s)| Some((*f)? - (*s)?))
        .collect()
}

pub fn macd_line(values: &[f64]) -> f64 {
    line_path(values).last().copied().unwrap_or(f64::NAN)
}

pub fn macd_signal(values: &[f64]) -> f64 {
    ema_path(&line_path(values), SIGNAL)
        .last()
        .copied()
        .flatten()
        .unwrap_or(f64::NAN)
}
