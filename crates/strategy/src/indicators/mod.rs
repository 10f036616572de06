//! Indicator computations over a candle history.
//!
//! Every series is index-aligned with the candles and holds `None` until the
//! indicator's warm-up is complete. All functions recompute from the candles
//! they are given; nothing is carried between calls, so running on a longer
//! history reproduces identical values at the overlapping indices.

pub mod adx;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use std::collections::BTreeMap;

use common::Candle;

pub use adx::AdxIndicator;
pub use bollinger::{BollingerIndicator, BollingerSeries};
pub use ema::{ema_of_defined, ema_of_series};
pub use macd::{histogram_cross, MacdCross, MacdIndicator, MacdSeries};
pub use rsi::RsiIndicator;
pub use sma::sma_of_series;

pub const VOLUME_SMA_PERIOD: usize = 20;

/// All indicator series for one candle history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub adx: Vec<Option<f64>>,
    pub ema_9: Vec<Option<f64>>,
    pub ema_21: Vec<Option<f64>>,
    pub ema_50: Vec<Option<f64>>,
    pub ema_200: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub volume_sma: Vec<Option<f64>>,
}

impl IndicatorSet {
    /// Compute every indicator with its standard parameters.
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let macd = MacdIndicator::default().series(&closes);
        let bb = BollingerIndicator::default().series(&closes);

        Self {
            rsi: RsiIndicator::default().series(&closes),
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            adx: AdxIndicator::default().series(candles),
            ema_9: ema_of_series(&closes, 9),
            ema_21: ema_of_series(&closes, 21),
            ema_50: ema_of_series(&closes, 50),
            ema_200: ema_of_series(&closes, 200),
            bb_upper: bb.upper,
            bb_middle: bb.middle,
            bb_lower: bb.lower,
            volume_sma: sma_of_series(&volumes, VOLUME_SMA_PERIOD),
        }
    }

    /// Named series, in a stable order. Names double as indicator keys in
    /// explanations.
    pub fn named(&self) -> [(&'static str, &[Option<f64>]); 13] {
        [
            ("rsi", self.rsi.as_slice()),
            ("macd", self.macd.as_slice()),
            ("macd_signal", self.macd_signal.as_slice()),
            ("macd_histogram", self.macd_histogram.as_slice()),
            ("adx", self.adx.as_slice()),
            ("ema_9", self.ema_9.as_slice()),
            ("ema_21", self.ema_21.as_slice()),
            ("ema_50", self.ema_50.as_slice()),
            ("ema_200", self.ema_200.as_slice()),
            ("bb_upper", self.bb_upper.as_slice()),
            ("bb_middle", self.bb_middle.as_slice()),
            ("bb_lower", self.bb_lower.as_slice()),
            ("volume_sma", self.volume_sma.as_slice()),
        ]
    }

    /// Value of a series at the most recent candle.
    pub fn latest(series: &[Option<f64>]) -> Option<f64> {
        series.last().copied().flatten()
    }

    /// Value of a series one candle before the most recent.
    pub fn previous(series: &[Option<f64>]) -> Option<f64> {
        let n = series.len();
        if n < 2 {
            return None;
        }
        series[n - 2]
    }

    /// Every indicator defined at the latest candle, keyed by name.
    pub fn latest_values(&self) -> BTreeMap<String, f64> {
        self.named()
            .into_iter()
            .filter_map(|(name, series)| Some((name.to_string(), Self::latest(series)?)))
            .collect()
    }
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "expected {expected}, got {actual} (epsilon {epsilon})"
    );
}

/// Synthetic candles from close prices: open = previous close,
/// high/low one unit outside the body, constant volume.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    let data: Vec<(f64, f64, f64, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect();
    make_ohlc_candles(&data)
}

#[cfg(test)]
pub fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            timestamp: base + Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05)
            .collect()
    }

    #[test]
    fn fifty_candles_have_no_ema_200() {
        let set = IndicatorSet::compute(&make_candles(&wave(50)));
        assert_eq!(set.ema_200.len(), 50);
        assert!(set.ema_200.iter().all(Option::is_none));
        assert!(set.ema_50[49].is_some());
        assert!(set.ema_50[48].is_none());
    }

    #[test]
    fn warm_up_boundaries() {
        let set = IndicatorSet::compute(&make_candles(&wave(60)));
        assert!(set.rsi[13].is_none() && set.rsi[14].is_some());
        assert!(set.adx[27].is_none() && set.adx[28].is_some());
        assert!(set.ema_9[7].is_none() && set.ema_9[8].is_some());
        assert!(set.bb_middle[18].is_none() && set.bb_middle[19].is_some());
        assert!(set.macd_histogram[32].is_none() && set.macd_histogram[33].is_some());
    }

    #[test]
    fn longer_history_reproduces_prefix() {
        let closes = wave(120);
        let short = IndicatorSet::compute(&make_candles(&closes[..80]));
        let long = IndicatorSet::compute(&make_candles(&closes));
        for ((name, a), (_, b)) in short.named().into_iter().zip(long.named()) {
            assert_eq!(a, &b[..80], "series {name} drifted");
        }
    }

    #[test]
    fn single_candle_is_all_absent() {
        let set = IndicatorSet::compute(&make_candles(&[100.0]));
        assert!(set.latest_values().is_empty());
    }

    #[test]
    fn latest_values_skip_absent() {
        let set = IndicatorSet::compute(&make_candles(&wave(60)));
        let values = set.latest_values();
        assert!(values.contains_key("rsi"));
        assert!(values.contains_key("ema_50"));
        assert!(!values.contains_key("ema_200"));
    }
}
