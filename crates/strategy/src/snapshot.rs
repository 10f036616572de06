use common::{validate_candles, Candle, Result};

use crate::indicators::IndicatorSet;
use crate::levels::{detect_levels, LevelConfig, SrLevel};

/// Everything a strategy may look at for one pair in one cycle. Built once,
/// then shared read-only by every evaluator.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub pair: String,
    pub timeframe: String,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSet,
    pub sr_levels: Vec<SrLevel>,
}

impl MarketSnapshot {
    /// Validate the history, compute indicators and detect levels.
    pub fn build(
        pair: impl Into<String>,
        timeframe: impl Into<String>,
        candles: Vec<Candle>,
        levels: &LevelConfig,
    ) -> Result<Self> {
        validate_candles(&candles)?;
        let indicators = IndicatorSet::compute(&candles);
        let sr_levels = detect_levels(&candles, levels);
        Ok(Self {
            pair: pair.into(),
            timeframe: timeframe.into(),
            candles,
            indicators,
            sr_levels,
        })
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Close of the most recent candle.
    pub fn price(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}
