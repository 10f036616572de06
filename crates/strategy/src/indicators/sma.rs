//! Simple Moving Average over a rolling window. Lookback: period - 1.

pub fn sma_of_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }
    // Each window is summed from scratch so a value never depends on
    // anything older than its own window.
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        result[i] = Some(window.iter().sum::<f64>() / period as f64);
    }
    result
}
