use common::{AnalysisData, Bias, Concept, Insight};
use strategy::levels::{nearest_above, nearest_below};
use strategy::{IndicatorSet, LevelKind, MarketSnapshot};

use crate::format_price;
use crate::glossary::ConceptGlossary;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const ADX_TRENDING: f64 = 25.0;
const VOLUME_SPIKE: f64 = 1.5;

/// Live per-indicator reading of one snapshot for the dashboard. Indicators
/// still warming up are left out.
pub fn build_analysis(snapshot: &MarketSnapshot, glossary: &dyn ConceptGlossary) -> AnalysisData {
    let price = snapshot.price().unwrap_or_default();
    let ind = &snapshot.indicators;
    let mut insights = Vec::new();

    let mut push = |concept: Concept, indicator: &str, value: f64, signal: Bias, overlay: bool, text: String| {
        let (title, tip) = match glossary.concept(concept) {
            Some(entry) => (entry.name.clone(), entry.short.clone()),
            None => (indicator.to_string(), String::new()),
        };
        insights.push(Insight {
            indicator: indicator.to_string(),
            value,
            signal,
            overlay,
            title,
            text,
            tip,
        });
    };

    if let Some(rsi) = IndicatorSet::latest(&ind.rsi) {
        let (signal, text) = if rsi < RSI_OVERSOLD {
            (Bias::Bullish, format!("RSI {rsi:.1} is oversold, a bounce is possible"))
        } else if rsi > RSI_OVERBOUGHT {
            (Bias::Bearish, format!("RSI {rsi:.1} is overbought, a pullback is possible"))
        } else {
            (Bias::Neutral, format!("RSI {rsi:.1} is in the neutral zone"))
        };
        push(Concept::Rsi, "rsi", rsi, signal, false, text);
    }

    if let Some(hist) = IndicatorSet::latest(&ind.macd_histogram) {
        let (signal, text) = if hist > 0.0 {
            (Bias::Bullish, format!("MACD histogram {hist:.4} is positive: bullish momentum"))
        } else if hist < 0.0 {
            (Bias::Bearish, format!("MACD histogram {hist:.4} is negative: bearish momentum"))
        } else {
            (Bias::Neutral, "MACD histogram is flat".to_string())
        };
        push(Concept::Macd, "macd", hist, signal, false, text);
    }

    if let Some(adx) = IndicatorSet::latest(&ind.adx) {
        let text = if adx >= ADX_TRENDING {
            format!("ADX {adx:.1}: the market is trending")
        } else {
            format!("ADX {adx:.1}: weak trend, ranging conditions")
        };
        push(Concept::Adx, "adx", adx, Bias::Neutral, false, text);
    }

    if let (Some(fast), Some(slow)) = (
        IndicatorSet::latest(&ind.ema_9),
        IndicatorSet::latest(&ind.ema_21),
    ) {
        let (signal, text) = if fast > slow {
            (Bias::Bullish, format!("EMA9 ({fast:.2}) above EMA21 ({slow:.2}): short-term uptrend"))
        } else if fast < slow {
            (Bias::Bearish, format!("EMA9 ({fast:.2}) below EMA21 ({slow:.2}): short-term downtrend"))
        } else {
            (Bias::Neutral, "EMA9 and EMA21 are level".to_string())
        };
        push(Concept::Ema, "ema", fast, signal, true, text);
    }

    if let (Some(upper), Some(middle), Some(lower)) = (
        IndicatorSet::latest(&ind.bb_upper),
        IndicatorSet::latest(&ind.bb_middle),
        IndicatorSet::latest(&ind.bb_lower),
    ) {
        let (signal, text) = if price <= lower {
            (Bias::Bullish, "Price is at the lower Bollinger band, stretched to the downside".to_string())
        } else if price >= upper {
            (Bias::Bearish, "Price is at the upper Bollinger band, stretched to the upside".to_string())
        } else {
            (Bias::Neutral, "Price is inside the Bollinger bands".to_string())
        };
        push(Concept::BollingerBands, "bollinger_bands", middle, signal, true, text);
    }

    let volume_avg = IndicatorSet::latest(&ind.volume_sma);
    if let (Some(avg), Some(last)) = (volume_avg, snapshot.last_candle()) {
        if avg > 0.0 {
            let ratio = last.volume / avg;
            let (signal, text) = if ratio >= VOLUME_SPIKE && last.is_bullish() {
                (Bias::Bullish, format!("Volume {ratio:.1}x average on a green candle: buyers in control"))
            } else if ratio >= VOLUME_SPIKE && last.is_bearish() {
                (Bias::Bearish, format!("Volume {ratio:.1}x average on a red candle: sellers in control"))
            } else {
                (Bias::Neutral, format!("Volume is {ratio:.1}x its average"))
            };
            push(Concept::Volume, "volume", last.volume, signal, false, text);
        }
    }

    let support = nearest_below(&snapshot.sr_levels, price, LevelKind::Support)
        .or_else(|| snapshot.sr_levels.iter().find(|l| l.kind == LevelKind::Support && l.price == price));
    let resistance = nearest_above(&snapshot.sr_levels, price, LevelKind::Resistance);
    let level = match (support, resistance) {
        (Some(s), Some(r)) if price - s.price <= r.price - price => Some((s, Bias::Bullish)),
        (_, Some(r)) => Some((r, Bias::Bearish)),
        (Some(s), None) => Some((s, Bias::Bullish)),
        (None, None) => None,
    };
    if let Some((level, signal)) = level {
        let text = match level.kind {
            LevelKind::Support => format!(
                "Closest level is support at {} ({} touches)",
                format_price(level.price),
                level.touches
            ),
            LevelKind::Resistance => format!(
                "Closest level is resistance at {} ({} touches)",
                format_price(level.price),
                level.touches
            ),
        };
        push(Concept::SupportResistance, "support_resistance", level.price, signal, true, text);
    }

    let (overall, summary) = overall_bias(&insights);

    AnalysisData {
        price,
        pair: snapshot.pair.clone(),
        timeframe: snapshot.timeframe.clone(),
        overall,
        summary,
        insights,
        indicators: ind.latest_values(),
    }
}

/// Majority of directional readings; a tie is neutral.
fn overall_bias(insights: &[Insight]) -> (Bias, String) {
    let bullish = insights.iter().filter(|i| i.signal == Bias::Bullish).count();
    let bearish = insights.iter().filter(|i| i.signal == Bias::Bearish).count();
    let neutral = insights.len() - bullish - bearish;
    let overall = if bullish > bearish {
        Bias::Bullish
    } else if bearish > bullish {
        Bias::Bearish
    } else {
        Bias::Neutral
    };
    let summary = format!(
        "{bullish} bullish, {bearish} bearish, {neutral} neutral readings: overall {overall}"
    );
    (overall, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::Glossary;
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;
    use strategy::LevelConfig;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut prev = closes.first().copied().unwrap_or_default();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = prev;
                prev = close;
                Candle {
                    timestamp: base + Duration::minutes(15 * i as i64),
                    open,
                    high: open.max(close) + 1.0,
                    low: open.min(close) - 1.0,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    #[test]
    fn steady_uptrend_reads_bullish() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let snapshot =
            MarketSnapshot::build("BTCUSDT", "15m", candles(&closes), &LevelConfig::default()).unwrap();
        let glossary = Glossary::builtin();
        let data = build_analysis(&snapshot, &glossary);

        assert_eq!(data.price, closes[119]);
        assert_eq!(data.overall, Bias::Bullish);
        let ema = data.insights.iter().find(|i| i.indicator == "ema").unwrap();
        assert_eq!(ema.signal, Bias::Bullish);
        assert!(ema.overlay);
        assert_eq!(ema.title, "EMA (Exponential Moving Average)");
        let rsi = data.insights.iter().find(|i| i.indicator == "rsi").unwrap();
        assert_eq!(rsi.signal, Bias::Bearish);
        assert!(!rsi.overlay);
        assert!(data.indicators.contains_key("ema_50"));
        assert!(data.summary.ends_with("overall bullish"));
    }

    #[test]
    fn short_history_leaves_out_warming_indicators() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let snapshot =
            MarketSnapshot::build("ETHUSDT", "1h", candles(&closes), &LevelConfig::default()).unwrap();
        let data = build_analysis(&snapshot, &Glossary::builtin());
        assert!(data.insights.iter().all(|i| i.indicator != "rsi" && i.indicator != "adx"));
        assert!(!data.insights.iter().any(|i| i.indicator == "ema"));
    }

    fn reading(signal: Bias) -> Insight {
        Insight {
            indicator: "x".into(),
            value: 0.0,
            signal,
            overlay: false,
            title: String::new(),
            text: String::new(),
            tip: String::new(),
        }
    }

    #[test]
    fn tied_readings_are_neutral() {
        let insights = [
            reading(Bias::Bullish),
            reading(Bias::Bearish),
            reading(Bias::Neutral),
        ];
        let (overall, summary) = overall_bias(&insights);
        assert_eq!(overall, Bias::Neutral);
        assert_eq!(summary, "1 bullish, 1 bearish, 1 neutral readings: overall neutral");
        assert_eq!(overall_bias(&[]).0, Bias::Neutral);
    }
}
