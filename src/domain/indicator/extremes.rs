//! Rolling extremes over the window (e.g. distance-from-high drawdown signals).

use crate::domain::indicator::Transform;

pub const MAX: Transform = Transform {
    min_points: 1,
    apply: max,
};

pub const MIN: Transform = Transform {
    min_points: 1,
    apply: min,
};

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
