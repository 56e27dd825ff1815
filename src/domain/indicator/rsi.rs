//! RSI (Relative Strength Index) over the window.
//!
//! Gains and losses are the positive and negative changes between consecutive
//! window values. The window is one Wilder period, so the averages are the
//! seed averages: simple means over all changes in the window.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100

use crate::domain::indicator::Transform;

pub const TRANSFORM: Transform = Transform {
    min_points: 2,
    apply: relative_strength,
};

pub fn relative_strength(values: &[f64]) -> f64 {
    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in values.windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let changes = (values.len() - 1) as f64;
    let avg_gain = gains / changes;
    let avg_loss = losses / changes;

    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
