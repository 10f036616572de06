use serde::{Deserialize, Serialize};

use common::Candle;

/// Swing-point clustering parameters. Lives under `[levels]` in the
/// strategy file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Number of most recent candles scanned for swing points.
    pub lookback: usize,
    /// A swing high/low must be the extreme of `radius` candles either side.
    pub swing_radius: usize,
    /// Cluster width as a fraction of the current close (0.001 = 0.1 %).
    pub tolerance_pct: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            swing_radius: 2,
            tolerance_pct: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SrLevel {
    pub price: f64,
    pub kind: LevelKind,
    /// `min(touches, 5)`.
    pub strength: u8,
    pub touches: usize,
}

const MAX_STRENGTH: usize = 5;

/// Find support/resistance levels in the last `lookback` candles.
///
/// Swing highs and lows are pooled, sorted ascending and merged into the
/// nearest cluster within tolerance. The result is ordered by price and does
/// not depend on the order in which swing points were found.
pub fn detect_levels(candles: &[Candle], cfg: &LevelConfig) -> Vec<SrLevel> {
    let Some(last) = candles.last() else {
        return Vec::new();
    };
    let start = candles.len().saturating_sub(cfg.lookback);
    let points = swing_points(&candles[start..], cfg.swing_radius);
    levels_from_points(&points, last.close, cfg.tolerance_pct)
}

/// Cluster raw swing prices into levels relative to `close`. The input
/// order is irrelevant.
pub fn levels_from_points(points: &[f64], close: f64, tolerance_pct: f64) -> Vec<SrLevel> {
    let mut sorted = points.to_vec();
    sorted.sort_by(f64::total_cmp);
    cluster(&sorted, tolerance_pct * close.abs())
        .into_iter()
        .map(|(price, touches)| SrLevel {
            price,
            kind: if price <= close {
                LevelKind::Support
            } else {
                LevelKind::Resistance
            },
            strength: touches.min(MAX_STRENGTH) as u8,
            touches,
        })
        .collect()
}

fn swing_points(window: &[Candle], radius: usize) -> Vec<f64> {
    let n = window.len();
    let mut points = Vec::new();
    if radius == 0 || n < 2 * radius + 1 {
        return points;
    }
    for i in radius..n - radius {
        let around = &window[i - radius..=i + radius];
        let high = window[i].high;
        let low = window[i].low;
        if around.iter().all(|c| c.high <= high) {
            points.push(high);
        }
        if around.iter().all(|c| c.low >= low) {
            points.push(low);
        }
    }
    points
}

/// Merge sorted points into (mean, count) clusters, ascending by mean.
fn cluster(sorted: &[f64], tolerance: f64) -> Vec<(f64, usize)> {
    // (sum, count)
    let mut clusters: Vec<(f64, usize)> = Vec::new();
    for &p in sorted {
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, (sum, count))| (i, (sum / *count as f64 - p).abs()))
            .filter(|(_, dist)| *dist <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        match nearest {
            Some(i) => {
                clusters[i].0 += p;
                clusters[i].1 += 1;
            }
            None => clusters.push((p, 1)),
        }
    }
    let mut levels: Vec<(f64, usize)> = clusters
        .into_iter()
        .map(|(sum, count)| (sum / count as f64, count))
        .collect();
    levels.sort_by(|a, b| a.0.total_cmp(&b.0));
    levels
}

/// Nearest level of `kind` strictly above `price`.
pub fn nearest_above(levels: &[SrLevel], price: f64, kind: LevelKind) -> Option<&SrLevel> {
    levels
        .iter()
        .filter(|l| l.kind == kind && l.price > price)
        .min_by(|a, b| a.price.total_cmp(&b.price))
}

/// Nearest level of `kind` strictly below `price`.
pub fn nearest_below(levels: &[SrLevel], price: f64, kind: LevelKind) -> Option<&SrLevel> {
    levels
        .iter()
        .filter(|l| l.kind == kind && l.price < price)
        .max_by(|a, b| a.price.total_cmp(&b.price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_candles;

    /// Zig-zag between two bands: highs near 110, lows near 90.
    fn range_bound(n: usize) -> Vec<Candle> {
        let data: Vec<(f64, f64, f64, f64)> = (0..n)
            .map(|i| match i % 4 {
                0 => (100.0, 102.0, 90.0 + (i % 3) as f64 * 0.01, 95.0),
                1 => (95.0, 104.0, 94.0, 103.0),
                2 => (103.0, 110.0 - (i % 3) as f64 * 0.01, 101.0, 105.0),
                _ => (105.0, 106.0, 97.0, 100.0),
            })
            .collect();
        make_ohlc_candles(&data)
    }

    #[test]
    fn finds_support_and_resistance_bands() {
        let candles = range_bound(60);
        let levels = detect_levels(&candles, &LevelConfig::default());
        let support = levels
            .iter()
            .find(|l| l.kind == LevelKind::Support && (l.price - 90.0).abs() < 0.1)
            .expect("support near 90");
        let resistance = levels
            .iter()
            .find(|l| l.kind == LevelKind::Resistance && (l.price - 110.0).abs() < 0.1)
            .expect("resistance near 110");
        assert!(support.touches > 5);
        assert_eq!(support.strength, 5);
        assert_eq!(resistance.strength, 5);
    }

    #[test]
    fn levels_are_sorted_ascending() {
        let levels = detect_levels(&range_bound(80), &LevelConfig::default());
        assert!(levels.windows(2).all(|w| w[0].price < w[1].price));
    }

    #[test]
    fn too_few_candles_give_no_levels() {
        assert!(detect_levels(&[], &LevelConfig::default()).is_empty());
        assert!(detect_levels(&range_bound(4), &LevelConfig::default()).is_empty());
    }

    #[test]
    fn cluster_merges_within_tolerance_only() {
        let clusters = cluster(&[100.0, 100.05, 100.09, 105.0], 0.1);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].1, 3);
        assert!((clusters[0].0 - 100.046_666).abs() < 1e-3);
        assert_eq!(clusters[1], (105.0, 1));
    }

    #[test]
    fn nearest_helpers() {
        let levels = vec![
            SrLevel { price: 90.0, kind: LevelKind::Support, strength: 2, touches: 2 },
            SrLevel { price: 95.0, kind: LevelKind::Support, strength: 1, touches: 1 },
            SrLevel { price: 105.0, kind: LevelKind::Resistance, strength: 1, touches: 1 },
            SrLevel { price: 110.0, kind: LevelKind::Resistance, strength: 3, touches: 3 },
        ];
        assert_eq!(nearest_below(&levels, 100.0, LevelKind::Support).unwrap().price, 95.0);
        assert_eq!(nearest_above(&levels, 100.0, LevelKind::Resistance).unwrap().price, 105.0);
        assert!(nearest_above(&levels, 120.0, LevelKind::Resistance).is_none());
    }
}
