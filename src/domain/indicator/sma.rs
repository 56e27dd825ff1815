//! Simple moving average: arithmetic mean of the window.

use crate::domain::indicator::Transform;

pub const TRANSFORM: Transform = Transform {
    min_points: 1,
    apply: mean,
};

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_values() {
        assert!((mean(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn single_value() {
        assert!((mean(&[42.0]) - 42.0).abs() < f64::EPSILON);
    }
}
