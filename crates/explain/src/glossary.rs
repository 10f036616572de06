use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Concept, Error, Result};

/// Teaching material for one trading concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEntry {
    pub name: String,
    /// One-line summary used in learning points.
    pub short: String,
    pub explanation: String,
    pub formula: String,
}

/// Lookup table keyed by concept identifiers (`rsi`, `macd`, ...).
pub trait ConceptGlossary: Send + Sync {
    fn lookup(&self, key: &str) -> Option<&ConceptEntry>;

    fn concept(&self, concept: Concept) -> Option<&ConceptEntry> {
        self.lookup(concept.key())
    }
}

/// Built-in English glossary, optionally patched from a TOML file so wording
/// can change without touching the decision logic.
#[derive(Debug, Clone, PartialEq)]
pub struct Glossary {
    entries: BTreeMap<String, ConceptEntry>,
}

impl Default for Glossary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ConceptGlossary for Glossary {
    fn lookup(&self, key: &str) -> Option<&ConceptEntry> {
        self.entries.get(&key.to_lowercase())
    }
}

impl Glossary {
    pub fn builtin() -> Self {
        let entries = Concept::ALL
            .into_iter()
            .map(|c| (c.key().to_string(), builtin_entry(c)))
            .collect();
        Self { entries }
    }

    /// Replace or add entries from a TOML document of the form
    /// `[rsi] name = "..." short = "..." ...`.
    pub fn with_overrides(mut self, toml_src: &str) -> Result<Self> {
        let overrides: BTreeMap<String, ConceptEntry> = toml::from_str(toml_src)
            .map_err(|e| Error::Config(format!("invalid glossary overrides: {e}")))?;
        for (key, entry) in overrides {
            self.entries.insert(key.to_lowercase(), entry);
        }
        Ok(self)
    }

    /// Built-in table patched with the overrides file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read glossary at '{}': {e}", path.display()))
        })?;
        Self::builtin().with_overrides(&src)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConceptEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Case-insensitive match on key, name or summary.
    pub fn search(&self, query: &str) -> Vec<(&str, &ConceptEntry)> {
        let query = query.to_lowercase();
        self.entries()
            .filter(|(key, entry)| {
                key.contains(&query)
                    || entry.name.to_lowercase().contains(&query)
                    || entry.short.to_lowercase().contains(&query)
            })
            .collect()
    }
}

fn entry(name: &str, short: &str, explanation: &str, formula: &str) -> ConceptEntry {
    ConceptEntry {
        name: name.to_string(),
        short: short.to_string(),
        explanation: explanation.to_string(),
        formula: formula.to_string(),
    }
}

fn builtin_entry(concept: Concept) -> ConceptEntry {
    match concept {
        Concept::Rsi => entry(
            "RSI (Relative Strength Index)",
            "Measures whether price has moved too far, too fast",
            "RSI measures the speed and size of recent price moves on a 0-100 scale. \
             Below 30 is oversold (price has fallen hard and may bounce), above 70 is \
             overbought (price has risen hard and may pull back), 50 is neutral. \
             Treat it as confirmation rather than a signal on its own: in a strong \
             uptrend RSI can stay above 70 for a long time.",
            "RSI = 100 - 100 / (1 + RS), RS = average gain / average loss (Wilder, 14)",
        ),
        Concept::Macd => entry(
            "MACD (Moving Average Convergence Divergence)",
            "Tracks shifts in momentum and trend direction",
            "MACD compares two EMAs. The MACD line is EMA(12) - EMA(26), the signal \
             line is EMA(9) of the MACD line and the histogram is their difference. \
             When the histogram flips from negative to positive, momentum has turned \
             bullish; the reverse flip is bearish. A growing histogram means momentum \
             is accelerating.",
            "MACD = EMA(12) - EMA(26), Signal = EMA(9) of MACD, Histogram = MACD - Signal",
        ),
        Concept::Ema => entry(
            "EMA (Exponential Moving Average)",
            "Average price that weights recent candles more heavily",
            "EMAs react faster than simple averages. EMA 9 tracks the very short term, \
             EMA 21 the short term, EMA 50 the medium term and EMA 200 the long-term \
             trend. Price above an EMA is bullish for that horizon. When all four are \
             stacked in order, every timescale agrees on the direction.",
            "EMA = price × k + previous EMA × (1 - k), k = 2 / (period + 1)",
        ),
        Concept::BollingerBands => entry(
            "Bollinger Bands",
            "Volatility envelope around a 20-period average",
            "The middle band is the 20-period SMA; the outer bands sit two standard \
             deviations away. Price at a band is stretched relative to recent \
             volatility and often reverts toward the middle. Narrow bands (a squeeze) \
             tend to precede a large move.",
            "Upper = SMA(20) + 2σ, Lower = SMA(20) - 2σ",
        ),
        Concept::SupportResistance => entry(
            "Support & Resistance",
            "Price zones where reversals have clustered before",
            "Support is a floor where buyers have repeatedly stepped in; resistance is \
             a ceiling where sellers have. The more touches a level has survived, the \
             stronger it is. A level that breaks often flips role: old resistance \
             becomes new support.",
            "Clusters of swing highs and lows within a small price band",
        ),
        Concept::CandlestickPatterns => entry(
            "Candlestick Patterns",
            "Candle shapes that reveal who won the session",
            "An engulfing candle swallows the previous candle's body and shows one side \
             taking control. A hammer has a long lower wick: sellers pushed down but \
             buyers pushed back. A shooting star is the mirror image. Patterns matter \
             most when they appear at support or resistance.",
            "Visual pattern recognition on the last one or two candles",
        ),
        Concept::Adx => entry(
            "ADX (Average Directional Index)",
            "Measures trend strength, not direction",
            "ADX below 20 means a weak or ranging market, 25 and above a trending one, \
             40 and above a strong trend. It says nothing about direction, so it is \
             used to decide whether other signals are worth acting on.",
            "ADX = Wilder average of DX, DX = 100 × |+DI - -DI| / (+DI + -DI)",
        ),
        Concept::RiskReward => entry(
            "Risk:Reward Ratio",
            "Potential profit compared with potential loss",
            "A 1:2 risk:reward risks one unit to make two. With a 1:2 ratio you can be \
             wrong more often than right and still come out ahead. Trades below 1:1.5 \
             need an unusually high win rate to be worth taking.",
            "R:R = |take profit - entry| / |entry - stop loss|",
        ),
        Concept::Volume => entry(
            "Volume",
            "How much was traded, the fuel behind a move",
            "A price move on high volume has real participation behind it; the same \
             move on thin volume is easy to reverse. Breakouts without volume are \
             often false.",
            "Volume = units traded in the period, compared with its 20-period average",
        ),
        Concept::Confluence => entry(
            "Confluence",
            "Several independent signals agreeing on one direction",
            "One indicator can be wrong. When trend, momentum, price action and volume \
             all point the same way, the odds improve. The confluence score counts how \
             many independent strategies agree.",
            "Score = strategies voting for the winning direction",
        ),
    }
}
