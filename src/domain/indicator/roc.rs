//! ROC (Rate of Change) over the window.
//!
//! ROC = ((last - first) / first) * 100
//! If first == 0: ROC = 0

use crate::domain::indicator::Transform;

pub const TRANSFORM: Transform = Transform {
    min_points: 2,
    apply: rate_of_change,
};

pub fn rate_of_change(values: &[f64]) -> f64 {
    let first = values[0];
    let last = values[values.len() - 1];
    if first == 0.0 {
        0.0
    } else {
        ((last - first) / first) * 100.0
    }
}
