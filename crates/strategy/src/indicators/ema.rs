//! Exponential Moving Average.
//!
//! EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` values.

/// EMA over a fully defined series. Indices below `period - 1` are `None`.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..n {
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = Some(ema);
        prev = ema;
    }
    result
}

/// EMA over a series that is absent during its own warm-up (e.g. the MACD
/// line). The seed is the SMA of the first `period` defined values.
pub fn ema_of_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return result;
    };
    let tail: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
    for (offset, v) in ema_of_series(&tail, period).into_iter().enumerate() {
        result[start + offset] = v;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_input() {
        let result = ema_of_series(&[100.0, 200.0, 300.0], 1);
        assert_approx(result[0].unwrap(), 100.0, DEFAULT_EPSILON);
        assert_approx(result[2].unwrap(), 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed at index 2 = SMA(10,11,12) = 11
        let result = ema_of_series(&[10.0, 11.0, 12.0, 13.0, 14.0], 3);
        assert!(result[0].is_none());
        assert!(result[1].is_none());
        assert_approx(result[2].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(result[3].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(result[4].unwrap(), 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_short_input_is_all_none() {
        let result = ema_of_series(&[1.0; 50], 200);
        assert_eq!(result.len(), 50);
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn ema_of_defined_offsets_seed() {
        let values = vec![None, None, Some(10.0), Some(11.0), Some(12.0), Some(13.0)];
        let result = ema_of_defined(&values, 3);
        assert!(result[..4].iter().all(Option::is_none));
        assert_approx(result[4].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(result[5].unwrap(), 12.0, DEFAULT_EPSILON);
    }
}
