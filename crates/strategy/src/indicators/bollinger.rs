//! Bollinger Bands: SMA(close, period) ± multiplier × population stddev.
//! Lookback: period - 1.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    pub period: usize,
    pub multiplier: f64,
}

impl Default for BollingerIndicator {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl BollingerIndicator {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self { period, multiplier }
    }

    pub fn series(&self, closes: &[f64]) -> BollingerSeries {
        let n = closes.len();
        let mut out = BollingerSeries {
            upper: vec![None; n],
            middle: vec![None; n],
            lower: vec![None; n],
        };
        if n < self.period {
            return out;
        }

        let p = self.period as f64;
        for i in (self.period - 1)..n {
            let window = &closes[i + 1 - self.period..=i];
            let mean = window.iter().sum::<f64>() / p;
            let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / p;
            let band = self.multiplier * variance.sqrt();
            out.middle[i] = Some(mean);
            out.upper[i] = Some(mean + band);
            out.lower[i] = Some(mean - band);
        }
        out
    }
}
