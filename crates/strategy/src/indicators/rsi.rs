/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// The first value sits at index `period`; earlier indices are `None`.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self::new(14)
    }
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// RSI for every index of `closes` (oldest first).
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let n = closes.len();
        let mut out = vec![None; n];
        if n < self.period + 1 {
            return out;
        }

        let p = self.period as f64;
        // changes[j] is the move into candle j + 1
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / p;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / p;
        out[self.period] = Some(rsi_value(avg_gain, avg_loss));

        // Wilder smoothing over remaining changes
        for (j, &change) in changes.iter().enumerate().skip(self.period) {
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (p - 1.0) + gain) / p;
            avg_loss = (avg_loss * (p - 1.0) + loss) / p;
            out[j + 1] = Some(rsi_value(avg_gain, avg_loss));
        }
        out
    }

    /// RSI of the latest close only.
    pub fn latest(&self, closes: &[f64]) -> Option<f64> {
        self.series(closes).last().copied().flatten()
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
