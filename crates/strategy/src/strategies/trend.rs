use std::collections::{BTreeMap, HashMap};

use common::{Concept, Direction, Result};

use super::{Reason, StrategyKind, StrategySignal};
use crate::indicators::IndicatorSet;
use crate::snapshot::MarketSnapshot;

const KIND: StrategyKind = StrategyKind::Trend;

const TRENDING_ADX: f64 = 25.0;

/// EMA ribbon fully stacked (9 > 21 > 50 > 200 or the reverse) with price on
/// the same side of the 200.
pub fn evaluate(
    snapshot: &MarketSnapshot,
    _params: &HashMap<String, toml::Value>,
) -> Result<StrategySignal> {
    let ind = &snapshot.indicators;
    let (Some(e9), Some(e21), Some(e50), Some(e200), Some(close)) = (
        IndicatorSet::latest(&ind.ema_9),
        IndicatorSet::latest(&ind.ema_21),
        IndicatorSet::latest(&ind.ema_50),
        IndicatorSet::latest(&ind.ema_200),
        snapshot.price(),
    ) else {
        return Ok(StrategySignal::none(KIND));
    };

    let direction = if e9 > e21 && e21 > e50 && e50 > e200 && close > e200 {
        Direction::Buy
    } else if e9 < e21 && e21 < e50 && e50 < e200 && close < e200 {
        Direction::Sell
    } else {
        return Ok(StrategySignal::none(KIND));
    };

    let mut snap = BTreeMap::from([
        ("ema_9".to_string(), e9),
        ("ema_21".to_string(), e21),
        ("ema_50".to_string(), e50),
        ("ema_200".to_string(), e200),
        ("close".to_string(), close),
    ]);

    let (order, side, trend) = match direction {
        Direction::Buy => (">", "above", "uptrend"),
        _ => ("<", "below", "downtrend"),
    };
    let mut reasons = vec![
        Reason::new(
            Concept::Ema,
            format!(
                "EMA stack aligned: EMA9 {e9:.2} {order} EMA21 {e21:.2} {order} EMA50 {e50:.2} {order} EMA200 {e200:.2}, every timescale agrees on the {trend}"
            ),
        ),
        Reason::new(
            Concept::Ema,
            format!(
                "Price {close:.2} is {side} EMA200 ({e200:.2}): the long-term trend supports the trade"
            ),
        ),
    ];

    let mut confidence = 0.6;
    if let Some(adx) = IndicatorSet::latest(&ind.adx).filter(|adx| *adx >= TRENDING_ADX) {
        snap.insert("adx".to_string(), adx);
        reasons.push(Reason::new(
            Concept::Adx,
            format!("ADX {adx:.2} confirms the {trend} has strength behind it"),
        ));
        confidence += 0.2;
    }

    Ok(StrategySignal::vote(KIND, direction, confidence, reasons, snap))
}
