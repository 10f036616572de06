use super::ema::{ema_of_defined, ema_of_series};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow), defined wherever EMA(slow) is.
/// Signal = EMA(macd_line, signal), seeded over its first `signal` defined
/// values. Histogram = MACD − Signal.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Direction of a histogram zero-cross on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdCross {
    Bullish, // histogram crossed from <= 0 to > 0
    Bearish, // histogram crossed from >= 0 to < 0
}

impl Default for MacdIndicator {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        assert!(signal >= 1, "MACD signal period must be >= 1");
        Self { fast, slow, signal }
    }

    /// Compute all three series from close prices (oldest first).
    pub fn series(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        let macd: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = ema_of_defined(&macd, self.signal);
        let histogram = macd
            .iter()
            .zip(&signal)
            .map(|(m, s)| Some((*m)? - (*s)?))
            .collect();
        MacdSeries { macd, signal, histogram }
    }
}

/// Zero-cross of the histogram between the last two candles, if any.
pub fn histogram_cross(histogram: &[Option<f64>]) -> Option<MacdCross> {
    let n = histogram.len();
    if n < 2 {
        return None;
    }
    let (prev, curr) = (histogram[n - 2]?, histogram[n - 1]?);
    if prev <= 0.0 && curr > 0.0 {
        Some(MacdCross::Bullish)
    } else if prev >= 0.0 && curr < 0.0 {
        Some(MacdCross::Bearish)
    } else {
        None
    }
}
