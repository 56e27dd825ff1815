//! Exponential moving averages.
//!
//! `ema` smooths the whole window with k = 2/(n+1), n being the number of
//! points in it, starting from the first value.
//!
//! `ema_path` is the fixed-period form MACD builds on: seeded with the SMA of
//! the first `period` values, then EMA[i] = v[i]*k + EMA[i-1]*(1-k).

use crate::domain::indicator::Transform;

pub const TRANSFORM: Transform = Transform {
    min_points: 1,
    apply: window_ema,
};

pub fn window_ema(values: &[f64]) -> f64 {
    let Some((&first, rest)) = values.split_first() else {
        return f64::NAN;
    };
    let k = 2.0 / (values.len() as f64 + 1.0);
    rest.iter().fold(first, |ema, &v| v * k + ema * (1.0 - k))
}

/// EMA of `values` at every index; `None` until the seed window is full.
pub fn ema_path(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);
    for (i, &v) in values.iter().enumerate().skip(period) {
        ema = v * k + ema * (1.0 - k);
        out[i] = Some(ema);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ema_weights_recent_values() {
        // k = 2/3
        let v = window_ema(&[10.0, 20.0]);
        assert!((v - 50.0 / 3.0).abs() < 1e-12);
        assert!((window_ema(&[7.0]) - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_prices() {
        assert!((window_ema(&[100.0; 6]) - 100.0).abs() < 1e-12);
        assert!(ema_path(&[100.0; 6], 3).iter().flatten().all(|v| (v - 100.0).abs() < 1e-12));
    }

    #[test]
    fn path_seed_is_sma() {
        let path = ema_path(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert_eq!(path[0], None);
        assert_eq!(path[1], None);
        assert!((path[2].unwrap() - 20.0).abs() < f64::EPSILON);

        let k = 0.5;
        let ema_3 = 40.0 * k + 20.0 * (1.0 - k);
        assert!((path[3].unwrap() - ema_3).abs() < f64::EPSILON);
        assert!((path[4].unwrap() - (50.0 * k + ema_3 * (1.0 - k))).abs() < f64::EPSILON);
    }

    #[test]
    fn path_shorter_than_period() {
        assert!(ema_path(&[1.0, 2.0], 3).iter().all(Option::is_none));
        assert!(ema_path(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }
}
