use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bar. Immutable once appended to a history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the bar.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

/// Check that a history is usable: at least one candle, timestamps strictly
/// increasing (duplicates and out-of-order bars are rejected).
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    if candles.is_empty() {
        return Err(Error::InvalidCandles("history is empty".into()));
    }
    for (i, w) in candles.windows(2).enumerate() {
        if w[1].timestamp == w[0].timestamp {
            return Err(Error::InvalidCandles(format!(
                "duplicate timestamp {} at index {}",
                w[1].timestamp,
                i + 1
            )));
        }
        if w[1].timestamp < w[0].timestamp {
            return Err(Error::InvalidCandles(format!(
                "timestamp {} at index {} precedes its predecessor",
                w[1].timestamp,
                i + 1
            )));
        }
    }
    Ok(())
}

/// Length of a timeframe label ("1m", "15m", "4h", "1d") in minutes.
pub fn timeframe_minutes(timeframe: &str) -> Option<i64> {
    let tf = timeframe.trim();
    if tf.len() < 2 {
        return None;
    }
    let (count, unit) = tf.split_at(tf.len() - 1);
    let count: i64 = count.parse().ok().filter(|c| *c > 0)?;
    let unit_minutes = match unit {
        "m" => 1,
        "h" => 60,
        "d" => 1440,
        "w" => 10_080,
        _ => return None,
    };
    Some(count * unit_minutes)
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Vote or decision direction. `Neutral` is the "no trade" outcome and
/// serializes as `NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[default]
    #[serde(rename = "NONE")]
    Neutral,
}

impl Direction {
    pub fn side(self) -> Option<OrderSide> {
        match self {
            Direction::Buy => Some(OrderSide::Buy),
            Direction::Sell => Some(OrderSide::Sell),
            Direction::Neutral => None,
        }
    }

    pub fn is_actionable(self) -> bool {
        self != Direction::Neutral
    }
}

impl From<OrderSide> for Direction {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Direction::Buy,
            OrderSide::Sell => Direction::Sell,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Neutral => write!(f, "NONE"),
        }
    }
}

/// Trading concepts a strategy reason can cite. The snake_case key is the
/// glossary lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Rsi,
    Macd,
    Ema,
    BollingerBands,
    SupportResistance,
    CandlestickPatterns,
    Adx,
    RiskReward,
    Volume,
    Confluence,
}

impl Concept {
    pub const ALL: [Concept; 10] = [
        Concept::Rsi,
        Concept::Macd,
        Concept::Ema,
        Concept::BollingerBands,
        Concept::SupportResistance,
        Concept::CandlestickPatterns,
        Concept::Adx,
        Concept::RiskReward,
        Concept::Volume,
        Concept::Confluence,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Concept::Rsi => "rsi",
            Concept::Macd => "macd",
            Concept::Ema => "ema",
            Concept::BollingerBands => "bollinger_bands",
            Concept::SupportResistance => "support_resistance",
            Concept::CandlestickPatterns => "candlestick_patterns",
            Concept::Adx => "adx",
            Concept::RiskReward => "risk_reward",
            Concept::Volume => "volume",
            Concept::Confluence => "confluence",
        }
    }
}

impl std::fmt::Display for Concept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// What the decision engine hands the ledger to open a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub pair: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub strategy: String,
    pub timeframe: String,
    pub confluence_score: u32,
}

/// A paper trade as recorded by the ledger. Field names are consumed by the
/// presentation layer and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub pair: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: TradeStatus,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub strategy: String,
    pub timeframe: String,
    pub confluence_score: u32,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Realized PnL in quote currency and percent for an exit at `exit_price`.
    pub fn pnl_at(&self, exit_price: f64) -> (f64, f64) {
        let delta = match self.side {
            OrderSide::Buy => exit_price - self.entry_price,
            OrderSide::Sell => self.entry_price - exit_price,
        };
        let pct = if self.entry_price > 0.0 {
            delta / self.entry_price * 100.0
        } else {
            0.0
        };
        (delta * self.quantity, pct)
    }
}

/// Frozen entry-time justification of a trade.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Explanation {
    pub full_text: String,
    pub reasons: Vec<String>,
    pub learning_points: Vec<String>,
    pub risk_reward_ratio: Option<f64>,
    pub indicators: BTreeMap<String, f64>,
}

/// Retrospective produced once a trade has closed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostAnalysis {
    pub result_summary: String,
    pub what_went_right: Vec<String>,
    pub what_went_wrong: Vec<String>,
    pub improvements: Vec<String>,
    pub lesson: String,
}

/// Why a closed trade was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl CloseReason {
    /// Infer the close reason from the exit price against the trade's
    /// levels. Returns `None` while the trade has no exit price.
    pub fn infer(trade: &Trade) -> Option<Self> {
        let exit = trade.exit_price?;
        let hit_tp = trade.take_profit.is_some_and(|tp| match trade.side {
            OrderSide::Buy => exit >= tp,
            OrderSide::Sell => exit <= tp,
        });
        let hit_sl = trade.stop_loss.is_some_and(|sl| match trade.side {
            OrderSide::Buy => exit <= sl,
            OrderSide::Sell => exit >= sl,
        });
        Some(if hit_tp {
            CloseReason::TakeProfit
        } else if hit_sl {
            CloseReason::StopLoss
        } else {
            CloseReason::Manual
        })
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "Take-profit reached"),
            CloseReason::StopLoss => write!(f, "Stop-loss hit"),
            CloseReason::Manual => write!(f, "Closed manually"),
        }
    }
}

/// Directional reading of a single indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

/// Per-indicator live reading for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub indicator: String,
    pub value: f64,
    pub signal: Bias,
    /// True when the indicator is drawn on the price chart itself.
    pub overlay: bool,
    pub title: String,
    pub text: String,
    pub tip: String,
}

/// Aggregated live view of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    pub price: f64,
    pub pair: String,
    pub timeframe: String,
    pub overall: Bias,
    pub summary: String,
    pub insights: Vec<Insight>,
    pub indicators: BTreeMap<String, f64>,
}

/// Push-update events for the external transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    NewTrade(Trade),
    PriceUpdate {
        pair: String,
        price: f64,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::NewTrade(_) => "new_trade",
            Notification::PriceUpdate { .. } => "price_update",
        }
    }
}

/// Current state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Halted => write!(f, "halted"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
    /// Close an open trade at the latest known price.
    CloseTrade(String),
    /// Leave the halted state after an operator has dealt with the alert.
    ClearHalt,
}
