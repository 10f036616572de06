use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, Direction};
use strategy::levels::{detect_levels, levels_from_points};
use strategy::{
    ConfluenceAggregator, IndicatorSet, LevelConfig, MarketSnapshot, StrategyConfig,
    StrategyFileConfig, StrategyKind,
};

/// Random walk of `steps.len()` candles starting at 100.
fn walk(steps: &[(f64, f64, f64)]) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut close = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, &(change_pct, wick_pct, volume))| {
            let open = close;
            close = (close * (1.0 + change_pct)).max(1.0);
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high: open.max(close) * (1.0 + wick_pct),
                low: open.min(close) * (1.0 - wick_pct),
                close,
                volume,
            }
        })
        .collect()
}

fn steps(len: impl Into<prop::collection::SizeRange>) -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((-0.03f64..0.03, 0.0f64..0.01, 1.0f64..5_000.0), len)
}

proptest! {
    /// score never exceeds the participants, which never exceed four, and an
    /// actionable decision always clears the configured minimum.
    #[test]
    fn decision_score_is_bounded(
        moves in steps(1..260usize),
        minimum in 1u32..5,
        enabled in prop::collection::vec(any::<bool>(), 4),
    ) {
        let mut cfg = StrategyFileConfig { minimum_confluence: minimum, ..StrategyFileConfig::default() };
        for (kind, on) in StrategyKind::ALL.into_iter().zip(enabled.iter()) {
            cfg = cfg.with_strategy(kind, StrategyConfig { enabled: *on, ..StrategyConfig::default() });
        }
        let snapshot = MarketSnapshot::build("BTCUSDT", "15m", walk(&moves), &cfg.levels).unwrap();
        let decision = ConfluenceAggregator::new(&cfg).decide(&snapshot);

        let enabled_count = enabled.iter().filter(|on| **on).count() as u32;
        prop_assert!(decision.score <= decision.participants);
        prop_assert!(decision.participants <= enabled_count);
        prop_assert!(enabled_count <= 4);
        if decision.direction == Direction::Neutral {
            prop_assert!(decision.contributing_signals.is_empty());
            prop_assert!(decision.trade_request().is_none());
        } else {
            prop_assert!(decision.score >= minimum);
            prop_assert_eq!(decision.contributing_signals.len() as u32, decision.score);
            prop_assert!(decision.contributing_signals.iter().all(|s| s.direction == decision.direction));
        }
        for vote in &decision.votes {
            prop_assert!((0.0..=1.0).contains(&vote.confidence));
            prop_assert_eq!(vote.direction == Direction::Neutral, vote.reasons.is_empty());
        }
    }

    /// Every series is absent below its warm-up, whatever the history length.
    #[test]
    fn indicators_absent_during_warm_up(moves in steps(1..230usize)) {
        let set = IndicatorSet::compute(&walk(&moves));
        let warm_up: [(&str, usize); 13] = [
            ("rsi", 14), ("macd", 25), ("macd_signal", 33), ("macd_histogram", 33),
            ("adx", 28), ("ema_9", 8), ("ema_21", 20), ("ema_50", 49), ("ema_200", 199),
            ("bb_upper", 19), ("bb_middle", 19), ("bb_lower", 19), ("volume_sma", 19),
        ];
        for ((name, series), (expected, first)) in set.named().into_iter().zip(warm_up) {
            prop_assert_eq!(name, expected);
            prop_assert_eq!(series.len(), moves.len());
            for (i, v) in series.iter().enumerate() {
                prop_assert_eq!(v.is_some(), i >= first, "{} at index {}", name, i);
            }
        }
    }

    /// Recomputing over a longer history leaves the overlapping prefix untouched.
    #[test]
    fn longer_history_keeps_prefix(moves in steps(40..220usize), cut in 1usize..40) {
        let candles = walk(&moves);
        let short = IndicatorSet::compute(&candles[..moves.len() - cut]);
        let long = IndicatorSet::compute(&candles);
        for ((name, a), (_, b)) in short.named().into_iter().zip(long.named()) {
            prop_assert_eq!(a, &b[..a.len()], "{} drifted", name);
        }
    }

    /// Level detection is idempotent and indifferent to point order.
    #[test]
    fn levels_ignore_scan_order(
        points in prop::collection::vec(50.0f64..150.0, 0..60),
        close in 50.0f64..150.0,
        rotate in 0usize..60,
    ) {
        let forward = levels_from_points(&points, close, 0.001);
        let mut reversed = points.clone();
        reversed.reverse();
        let mut rotated = points.clone();
        if !rotated.is_empty() {
            let k = rotate % rotated.len();
            rotated.rotate_left(k);
        }
        prop_assert_eq!(&forward, &levels_from_points(&reversed, close, 0.001));
        prop_assert_eq!(&forward, &levels_from_points(&rotated, close, 0.001));
        prop_assert!(forward.windows(2).all(|w| w[0].price <= w[1].price));
        prop_assert!(forward.iter().all(|l| (1..=5).contains(&l.strength) && l.touches >= 1));
        prop_assert_eq!(forward.iter().map(|l| l.touches).sum::<usize>(), points.len());
    }

    #[test]
    fn detect_levels_is_idempotent(moves in steps(1..200usize)) {
        let candles = walk(&moves);
        let cfg = LevelConfig::default();
        prop_assert_eq!(detect_levels(&candles, &cfg), detect_levels(&candles, &cfg));
    }
}
