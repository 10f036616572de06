use std::collections::{BTreeMap, HashMap};

use common::{Candle, Concept, Direction, Result};

use super::{check_range, Reason, StrategyKind, StrategySignal};
use crate::config::param_f64;
use crate::levels::{LevelKind, SrLevel};
use crate::snapshot::MarketSnapshot;

const KIND: StrategyKind = StrategyKind::PriceAction;

/// Opposite wick of a pin bar must stay under this fraction of the body.
const PIN_OPPOSITE_WICK_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
}

impl Pattern {
    fn direction(self) -> Direction {
        match self {
            Pattern::BullishEngulfing | Pattern::Hammer => Direction::Buy,
            Pattern::BearishEngulfing | Pattern::ShootingStar => Direction::Sell,
        }
    }

    fn describe(self, last: &Candle) -> String {
        match self {
            Pattern::BullishEngulfing => format!(
                "Bullish engulfing: the green candle (O {:.2} C {:.2}) swallowed the previous red body, buyers took control",
                last.open, last.close
            ),
            Pattern::BearishEngulfing => format!(
                "Bearish engulfing: the red candle (O {:.2} C {:.2}) swallowed the previous green body, sellers took control",
                last.open, last.close
            ),
            Pattern::Hammer => format!(
                "Hammer: long lower wick ({:.2}) against a small body ({:.2}), dips were bought back",
                last.lower_wick(),
                last.body()
            ),
            Pattern::ShootingStar => format!(
                "Shooting star: long upper wick ({:.2}) against a small body ({:.2}), rallies were sold",
                last.upper_wick(),
                last.body()
            ),
        }
    }
}

fn detect_pattern(candles: &[Candle], pin_wick_ratio: f64) -> Option<Pattern> {
    let n = candles.len();
    if n < 2 {
        return None;
    }
    let (prev, last) = (&candles[n - 2], &candles[n - 1]);

    if prev.is_bearish() && last.is_bullish() && last.close > prev.open && last.open < prev.close {
        return Some(Pattern::BullishEngulfing);
    }
    if prev.is_bullish() && last.is_bearish() && last.close < prev.open && last.open > prev.close {
        return Some(Pattern::BearishEngulfing);
    }

    let body = last.body();
    if body > 0.0 {
        if last.lower_wick() > body * pin_wick_ratio
            && last.upper_wick() < body * PIN_OPPOSITE_WICK_RATIO
        {
            return Some(Pattern::Hammer);
        }
        if last.upper_wick() > body * pin_wick_ratio
            && last.lower_wick() < body * PIN_OPPOSITE_WICK_RATIO
        {
            return Some(Pattern::ShootingStar);
        }
    }
    None
}

/// Closest level of `kind` within `tolerance_pct` of `price`.
fn level_near(levels: &[SrLevel], price: f64, kind: LevelKind, tolerance_pct: f64) -> Option<&SrLevel> {
    levels
        .iter()
        .filter(|l| l.kind == kind && (l.price - price).abs() / price <= tolerance_pct)
        .min_by(|a, b| (a.price - price).abs().total_cmp(&(b.price - price).abs()))
}

/// Reversal candle confirmed by a nearby level: bullish patterns at support,
/// bearish patterns at resistance.
pub fn evaluate(
    snapshot: &MarketSnapshot,
    params: &HashMap<String, toml::Value>,
) -> Result<StrategySignal> {
    let tolerance_pct = check_range(
        "level_tolerance_pct",
        param_f64(params, "level_tolerance_pct", 0.005)?,
        0.0,
        0.5,
    )?;
    let pin_wick_ratio =
        check_range("pin_wick_ratio", param_f64(params, "pin_wick_ratio", 2.0)?, 0.5, 20.0)?;

    let Some(last) = snapshot.last_candle() else {
        return Ok(StrategySignal::none(KIND));
    };
    let Some(pattern) = detect_pattern(&snapshot.candles, pin_wick_ratio) else {
        return Ok(StrategySignal::none(KIND));
    };
    let direction = pattern.direction();
    let price = last.close;
    if price <= 0.0 {
        return Ok(StrategySignal::none(KIND));
    }

    let wanted = if direction == Direction::Buy {
        LevelKind::Support
    } else {
        LevelKind::Resistance
    };
    let Some(level) = level_near(&snapshot.sr_levels, price, wanted, tolerance_pct) else {
        return Ok(StrategySignal::none(KIND));
    };

    let distance_pct = (price - level.price).abs() / price * 100.0;
    let level_reason = match wanted {
        LevelKind::Support => format!(
            "Price {price:.2} is {distance_pct:.2}% from support at {:.2} (touched {} times): buyers have defended this zone before",
            level.price, level.touches
        ),
        LevelKind::Resistance => format!(
            "Price {price:.2} is {distance_pct:.2}% from resistance at {:.2} (touched {} times): sellers have defended this zone before",
            level.price, level.touches
        ),
    };

    let reasons = vec![
        Reason::new(Concept::CandlestickPatterns, pattern.describe(last)),
        Reason::new(Concept::SupportResistance, level_reason),
    ];

    let mut snap = BTreeMap::new();
    snap.insert("close".to_string(), price);
    let key = match wanted {
        LevelKind::Support => "support",
        LevelKind::Resistance => "resistance",
    };
    snap.insert(key.to_string(), level.price);

    let confidence = 0.5 + 0.1 * level.strength as f64;
    Ok(StrategySignal::vote(KIND, direction, confidence, reasons, snap))
}
