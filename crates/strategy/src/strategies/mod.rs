//! The four strategy evaluators.
//!
//! The set is closed: each variant of [`StrategyKind`] maps to one pure
//! evaluation function over a [`MarketSnapshot`] and its parameter table.

pub mod price_action;
pub mod scalping;
pub mod technical;
pub mod trend;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use common::{Concept, Direction, Result};

use crate::snapshot::MarketSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Technical,
    PriceAction,
    Trend,
    Scalping,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Technical,
        StrategyKind::PriceAction,
        StrategyKind::Trend,
        StrategyKind::Scalping,
    ];

    /// Order in which reasons are listed and ties between equally confident
    /// strategies are broken.
    pub const PRIORITY: [StrategyKind; 4] = [
        StrategyKind::Trend,
        StrategyKind::Technical,
        StrategyKind::PriceAction,
        StrategyKind::Scalping,
    ];

    pub fn priority(self) -> usize {
        match self {
            StrategyKind::Trend => 0,
            StrategyKind::Technical => 1,
            StrategyKind::PriceAction => 2,
            StrategyKind::Scalping => 3,
        }
    }

    /// Config-file key.
    pub fn key(self) -> &'static str {
        match self {
            StrategyKind::Technical => "technical",
            StrategyKind::PriceAction => "price_action",
            StrategyKind::Trend => "trend",
            StrategyKind::Scalping => "scalping",
        }
    }

    /// Human-readable name shown in logs, trades and explanations.
    pub fn display_name(self) -> &'static str {
        match self {
            StrategyKind::Technical => "Technical Analysis",
            StrategyKind::PriceAction => "Price Action",
            StrategyKind::Trend => "Trend Following",
            StrategyKind::Scalping => "Scalping",
        }
    }

    /// Evaluate this strategy. `Err` only for configuration problems;
    /// missing indicator values produce a NONE signal.
    pub fn evaluate(
        self,
        snapshot: &MarketSnapshot,
        params: &HashMap<String, toml::Value>,
    ) -> Result<StrategySignal> {
        match self {
            StrategyKind::Technical => technical::evaluate(snapshot, params),
            StrategyKind::PriceAction => price_action::evaluate(snapshot, params),
            StrategyKind::Trend => trend::evaluate(snapshot, params),
            StrategyKind::Scalping => scalping::evaluate(snapshot, params),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One human-readable justification, tagged with the concept it cites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub concept: Concept,
    pub text: String,
}

impl Reason {
    pub fn new(concept: Concept, text: impl Into<String>) -> Self {
        Self {
            concept,
            text: text.into(),
        }
    }
}

/// One strategy's vote for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy: StrategyKind,
    pub strategy_name: String,
    pub direction: Direction,
    /// In `[0, 1]`; zero for NONE.
    pub confidence: f64,
    pub reasons: Vec<Reason>,
    /// Indicator values the strategy looked at, keyed by indicator name.
    pub indicator_snapshot: BTreeMap<String, f64>,
}

impl StrategySignal {
    pub fn none(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            strategy_name: strategy.display_name().to_string(),
            direction: Direction::Neutral,
            confidence: 0.0,
            reasons: Vec::new(),
            indicator_snapshot: BTreeMap::new(),
        }
    }

    pub fn vote(
        strategy: StrategyKind,
        direction: Direction,
        confidence: f64,
        reasons: Vec<Reason>,
        indicator_snapshot: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            strategy,
            strategy_name: strategy.display_name().to_string(),
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            reasons,
            indicator_snapshot,
        }
    }
}

/// Reject a threshold outside `[min, max]`.
pub(crate) fn check_range(key: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(common::Error::Config(format!(
            "parameter '{key}' = {value} is outside [{min}, {max}]"
        )))
    }
}
