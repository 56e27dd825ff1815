//! Dispersion indicators.
//!
//! STDDEV: population standard deviation of the window values.
//! sqrt(sum((x - mean)^2) / n)
//!
//! VOLATILITY: population standard deviation of the simple returns between
//! consecutive window values. Needs three points for two returns.

use crate::domain::indicator::Transform;
use crate::domain::indicator::sma::mean;

pub const STDDEV: Transform = Transform {
    min_points: 2,
    apply: population_stddev,
};

pub const VOLATILITY: Transform = Transform {
    min_points: 3,
    apply: return_volatility,
};

pub fn population_stddev(values: &[f64]) -> f64 {
    let avg = mean(values);
    let variance: f64 = values
        .iter()
        .map(|v| {
            let diff = v - avg;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

pub fn return_volatility(values: &[f64]) -> f64 {
    let returns: Vec<f64> = values
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
        .collect();
    population_stddev(&returns)
}
