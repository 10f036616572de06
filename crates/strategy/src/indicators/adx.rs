//! ADX: Average Directional Index (Wilder).
//!
//! 1. +DM / -DM and true range from consecutive candles (index >= 1)
//! 2. Wilder-smooth each, seeded with the mean of indices 1..=period
//! 3. DX = 100 * |+DI - -DI| / (+DI + -DI), defined from index `period`
//! 4. ADX seeded at index 2 * period with the mean of the preceding
//!    `period` DX values, then Wilder-smoothed
//!
//! Lookback: 2 * period.

use common::Candle;

#[derive(Debug, Clone)]
pub struct AdxIndicator {
    pub period: usize,
}

impl Default for AdxIndicator {
    fn default() -> Self {
        Self::new(14)
    }
}

impl AdxIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self { period }
    }

    pub fn lookback(&self) -> usize {
        2 * self.period
    }

    pub fn series(&self, candles: &[Candle]) -> Vec<Option<f64>> {
        let n = candles.len();
        let p = self.period;
        let mut adx = vec![None; n];
        if n <= 2 * p {
            return adx;
        }

        let mut plus_dm = vec![0.0; n];
        let mut minus_dm = vec![0.0; n];
        let mut tr = vec![0.0; n];
        for i in 1..n {
            let (cur, prev) = (&candles[i], &candles[i - 1]);
            let up = cur.high - prev.high;
            let down = prev.low - cur.low;
            plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
            minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
            tr[i] = (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs());
        }

        let smooth_tr = wilder_smooth(&tr, p);
        let smooth_plus = wilder_smooth(&plus_dm, p);
        let smooth_minus = wilder_smooth(&minus_dm, p);

        let mut dx = vec![0.0; n];
        for i in p..n {
            if smooth_tr[i] == 0.0 {
                continue;
            }
            let plus_di = 100.0 * smooth_plus[i] / smooth_tr[i];
            let minus_di = 100.0 * smooth_minus[i] / smooth_tr[i];
            let di_sum = plus_di + minus_di;
            if di_sum > 0.0 {
                dx[i] = 100.0 * (plus_di - minus_di).abs() / di_sum;
            }
        }

        let pf = p as f64;
        let seed = dx[p + 1..=2 * p].iter().sum::<f64>() / pf;
        adx[2 * p] = Some(seed);
        let mut prev = seed;
        for i in (2 * p + 1)..n {
            let value = (prev * (pf - 1.0) + dx[i]) / pf;
            adx[i] = Some(value);
            prev = value;
        }
        adx
    }
}

/// Wilder smoothing of `values[1..]`. Only indices >= `period` are meaningful.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; n];
    if n <= period {
        return out;
    }
    let pf = period as f64;
    let mut prev = values[1..=period].iter().sum::<f64>() / pf;
    out[period] = prev;
    for i in (period + 1)..n {
        prev = (prev * (pf - 1.0) + values[i]) / pf;
        out[i] = prev;
    }
    out
}
