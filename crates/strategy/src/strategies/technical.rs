use std::collections::{BTreeMap, HashMap};

use common::{Concept, Direction, Result};

use super::{check_range, Reason, StrategyKind, StrategySignal};
use crate::config::param_f64;
use crate::indicators::{histogram_cross, IndicatorSet, MacdCross};
use crate::snapshot::MarketSnapshot;

const KIND: StrategyKind = StrategyKind::Technical;

/// Price within this fraction of a Bollinger band counts as touching it.
const BAND_TOUCH_PCT: f64 = 0.01;
const STRONG_TREND_ADX: f64 = 40.0;

#[derive(Debug, Clone, Copy)]
struct Params {
    rsi_oversold: f64,
    rsi_overbought: f64,
    adx_threshold: f64,
}

impl Params {
    fn from_table(params: &HashMap<String, toml::Value>) -> Result<Self> {
        let rsi_oversold =
            check_range("rsi_oversold", param_f64(params, "rsi_oversold", 30.0)?, 0.0, 100.0)?;
        let rsi_overbought = check_range(
            "rsi_overbought",
            param_f64(params, "rsi_overbought", 70.0)?,
            0.0,
            100.0,
        )?;
        let adx_threshold =
            check_range("adx_threshold", param_f64(params, "adx_threshold", 25.0)?, 0.0, 100.0)?;
        if rsi_oversold >= rsi_overbought {
            return Err(common::Error::Config(format!(
                "rsi_oversold ({rsi_oversold}) must be below rsi_overbought ({rsi_overbought})"
            )));
        }
        Ok(Self {
            rsi_oversold,
            rsi_overbought,
            adx_threshold,
        })
    }
}

/// RSI extreme sets the bias, ADX gates it, a MACD histogram cross confirms
/// (same direction) or vetoes (opposite direction).
pub fn evaluate(
    snapshot: &MarketSnapshot,
    params: &HashMap<String, toml::Value>,
) -> Result<StrategySignal> {
    let p = Params::from_table(params)?;
    let ind = &snapshot.indicators;

    let (Some(rsi), Some(adx), Some(price)) = (
        IndicatorSet::latest(&ind.rsi),
        IndicatorSet::latest(&ind.adx),
        snapshot.price(),
    ) else {
        return Ok(StrategySignal::none(KIND));
    };

    let direction = if rsi <= p.rsi_oversold {
        Direction::Buy
    } else if rsi >= p.rsi_overbought {
        Direction::Sell
    } else {
        return Ok(StrategySignal::none(KIND));
    };

    if adx < p.adx_threshold {
        return Ok(StrategySignal::none(KIND));
    }

    let cross = histogram_cross(&ind.macd_histogram);
    let confirmed = match (direction, cross) {
        (Direction::Buy, Some(MacdCross::Bearish)) | (Direction::Sell, Some(MacdCross::Bullish)) => {
            return Ok(StrategySignal::none(KIND));
        }
        (_, Some(_)) => true,
        (_, None) => false,
    };

    let mut snap = BTreeMap::new();
    snap.insert("rsi".to_string(), rsi);
    snap.insert("adx".to_string(), adx);

    let mut reasons = Vec::new();
    let mut confidence = 0.5;

    reasons.push(match direction {
        Direction::Buy => Reason::new(
            Concept::Rsi,
            format!(
                "RSI(14) = {rsi:.2} is at or below {:.0}: oversold, sellers look exhausted and a bounce is likely",
                p.rsi_oversold
            ),
        ),
        _ => Reason::new(
            Concept::Rsi,
            format!(
                "RSI(14) = {rsi:.2} is at or above {:.0}: overbought, buyers look stretched and a pullback is likely",
                p.rsi_overbought
            ),
        ),
    });
    reasons.push(Reason::new(
        Concept::Adx,
        format!(
            "ADX(14) = {adx:.2} is above {:.0}: the market is trending strongly enough to act on",
            p.adx_threshold
        ),
    ));
    if adx >= STRONG_TREND_ADX {
        confidence += 0.15;
    }

    if confirmed {
        if let Some(hist) = IndicatorSet::latest(&ind.macd_histogram) {
            snap.insert("macd_histogram".to_string(), hist);
            let side = if direction == Direction::Buy { "positive" } else { "negative" };
            reasons.push(Reason::new(
                Concept::Macd,
                format!(
                    "MACD histogram just crossed {side} ({hist:.4}): momentum has shifted in the trade's direction"
                ),
            ));
            confidence += 0.25;
        }
    }

    let band = match direction {
        Direction::Buy => IndicatorSet::latest(&ind.bb_lower)
            .filter(|lower| price <= lower * (1.0 + BAND_TOUCH_PCT))
            .map(|lower| ("bb_lower", lower, "lower")),
        _ => IndicatorSet::latest(&ind.bb_upper)
            .filter(|upper| price >= upper * (1.0 - BAND_TOUCH_PCT))
            .map(|upper| ("bb_upper", upper, "upper")),
    };
    if let Some((key, value, side)) = band {
        snap.insert(key.to_string(), value);
        reasons.push(Reason::new(
            Concept::BollingerBands,
            format!(
                "Price {price:.2} is pressing the {side} Bollinger Band ({value:.2}): stretched away from the mean"
            ),
        ));
        confidence += 0.1;
    }

    Ok(StrategySignal::vote(KIND, direction, confidence, reasons, snap))
}
