use std::collections::{BTreeMap, HashMap};

use common::{timeframe_minutes, Concept, Direction, Result};

use super::{check_range, Reason, StrategyKind, StrategySignal};
use crate::config::{param_f64, param_usize};
use crate::indicators::IndicatorSet;
use crate::snapshot::MarketSnapshot;

const KIND: StrategyKind = StrategyKind::Scalping;

#[derive(Debug, Clone, Copy)]
struct Params {
    volume_multiple: f64,
    volume_window: usize,
    max_timeframe_minutes: usize,
}

impl Params {
    fn from_table(params: &HashMap<String, toml::Value>) -> Result<Self> {
        let volume_multiple = check_range(
            "volume_multiple",
            param_f64(params, "volume_multiple", 1.5)?,
            1.0,
            50.0,
        )?;
        let volume_window = param_usize(params, "volume_window", 20)?;
        if volume_window == 0 {
            return Err(common::Error::Config("volume_window must be at least 1".into()));
        }
        let max_timeframe_minutes = param_usize(params, "max_timeframe_minutes", 15)?;
        Ok(Self {
            volume_multiple,
            volume_window,
            max_timeframe_minutes,
        })
    }
}

/// Volume spike plus an EMA9/EMA21 cross on the latest candle. Only trades
/// short timeframes.
pub fn evaluate(
    snapshot: &MarketSnapshot,
    params: &HashMap<String, toml::Value>,
) -> Result<StrategySignal> {
    let p = Params::from_table(params)?;

    match timeframe_minutes(&snapshot.timeframe) {
        Some(minutes) if minutes as usize <= p.max_timeframe_minutes => {}
        _ => return Ok(StrategySignal::none(KIND)),
    }

    let candles = &snapshot.candles;
    let n = candles.len();
    if n < p.volume_window + 1 {
        return Ok(StrategySignal::none(KIND));
    }
    let latest_volume = candles[n - 1].volume;
    let average = candles[n - 1 - p.volume_window..n - 1]
        .iter()
        .map(|c| c.volume)
        .sum::<f64>()
        / p.volume_window as f64;
    if average <= 0.0 || latest_volume <= average * p.volume_multiple {
        return Ok(StrategySignal::none(KIND));
    }

    let ind = &snapshot.indicators;
    let (Some(e9), Some(e21), Some(prev9), Some(prev21)) = (
        IndicatorSet::latest(&ind.ema_9),
        IndicatorSet::latest(&ind.ema_21),
        IndicatorSet::previous(&ind.ema_9),
        IndicatorSet::previous(&ind.ema_21),
    ) else {
        return Ok(StrategySignal::none(KIND));
    };

    let direction = if prev9 <= prev21 && e9 > e21 {
        Direction::Buy
    } else if prev9 >= prev21 && e9 < e21 {
        Direction::Sell
    } else {
        return Ok(StrategySignal::none(KIND));
    };

    let ratio = latest_volume / average;
    let cross = if direction == Direction::Buy {
        "crossed above"
    } else {
        "crossed below"
    };
    let reasons = vec![
        Reason::new(
            Concept::Volume,
            format!(
                "Volume {latest_volume:.2} is {ratio:.1}x the {}-candle average ({average:.2}): real participation behind the move",
                p.volume_window
            ),
        ),
        Reason::new(
            Concept::Ema,
            format!("EMA9 ({e9:.2}) just {cross} EMA21 ({e21:.2}): short-term momentum flipped"),
        ),
    ];

    let snap = BTreeMap::from([
        ("volume".to_string(), latest_volume),
        ("volume_avg".to_string(), average),
        ("ema_9".to_string(), e9),
        ("ema_21".to_string(), e21),
    ]);

    let confidence = if ratio >= 2.0 * p.volume_multiple { 0.8 } else { 0.6 };
    Ok(StrategySignal::vote(KIND, direction, confidence, reasons, snap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{flat_snapshot, no_params, set_latest, set_previous};

    /// 25 flat candles, last one with `spike` volume and a bullish EMA cross.
    fn crossing_snapshot(spike: f64) -> MarketSnapshot {
        let mut snap = flat_snapshot(25);
        if let Some(last) = snap.candles.last_mut() {
            last.volume = spike;
        }
        set_previous(&mut snap.indicators.ema_9, 99.0);
        set_previous(&mut snap.indicators.ema_21, 99.5);
        set_latest(&mut snap.indicators.ema_9, 100.2);
        set_latest(&mut snap.indicators.ema_21, 99.8);
        snap
    }

    #[test]
    fn spike_and_cross_buys() {
        let signal = evaluate(&crossing_snapshot(2_000.0), &no_params()).unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.reasons[0].concept, Concept::Volume);
        assert_eq!(signal.reasons[1].concept, Concept::Ema);
        assert_eq!(signal.indicator_snapshot["volume_avg"], 1000.0);
    }

    #[test]
    fn no_spike_abstains() {
        let signal = evaluate(&crossing_snapshot(1_400.0), &no_params()).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn no_cross_abstains() {
        let mut snap = crossing_snapshot(2_000.0);
        set_previous(&mut snap.indicators.ema_9, 100.0);
        let signal = evaluate(&snap, &no_params()).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn long_timeframe_abstains() {
        let mut snap = crossing_snapshot(2_000.0);
        snap.timeframe = "4h".into();
        assert_eq!(evaluate(&snap, &no_params()).unwrap().direction, Direction::Neutral);

        let mut params = no_params();
        params.insert("max_timeframe_minutes".into(), toml::Value::Integer(240));
        assert_eq!(evaluate(&snap, &params).unwrap().direction, Direction::Buy);
    }

    #[test]
    fn short_history_abstains() {
        let snap = flat_snapshot(10);
        assert_eq!(evaluate(&snap, &no_params()).unwrap().direction, Direction::Neutral);
    }

    #[test]
    fn bad_window_is_config_error() {
        let mut params = no_params();
        params.insert("volume_window".into(), toml::Value::Integer(0));
        assert!(evaluate(&crossing_snapshot(2_000.0), &params).is_err());
    }
}
