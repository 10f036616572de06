use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Direction, TradeRequest};

use crate::config::StrategyFileConfig;
use crate::levels::{nearest_above, nearest_below, LevelKind};
use crate::snapshot::MarketSnapshot;
use crate::strategies::{StrategyKind, StrategySignal};

/// Outcome of one aggregation round for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceDecision {
    pub pair: String,
    pub timeframe: String,
    pub entry_price: f64,
    pub direction: Direction,
    /// Votes for the winning direction; zero when no direction won outright.
    pub score: u32,
    /// Strategies that were enabled and evaluated cleanly this round.
    pub participants: u32,
    /// Signals that voted for `direction`, in priority order. Empty for NONE.
    pub contributing_signals: Vec<StrategySignal>,
    /// Every participant's signal, in priority order.
    pub votes: Vec<StrategySignal>,
    pub risk_reward_ratio: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl ConfluenceDecision {
    pub fn is_actionable(&self) -> bool {
        self.direction.is_actionable()
    }

    /// Contributing strategy names joined in priority order.
    pub fn strategy_label(&self) -> String {
        self.contributing_signals
            .iter()
            .map(|s| s.strategy_name.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// What the ledger needs to open this decision. `None` for NONE.
    pub fn trade_request(&self) -> Option<TradeRequest> {
        let side = self.direction.side()?;
        Some(TradeRequest {
            pair: self.pair.clone(),
            side,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            strategy: self.strategy_label(),
            timeframe: self.timeframe.clone(),
            confluence_score: self.score,
        })
    }
}

/// Runs the enabled strategies against one snapshot and turns their votes
/// into a single decision. Holds no state between rounds.
#[derive(Debug, Clone, Copy)]
pub struct ConfluenceAggregator<'a> {
    config: &'a StrategyFileConfig,
}

impl<'a> ConfluenceAggregator<'a> {
    pub fn new(config: &'a StrategyFileConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, snapshot: &MarketSnapshot) -> ConfluenceDecision {
        let entry_price = snapshot.price().unwrap_or_default();

        let mut votes: Vec<StrategySignal> = Vec::new();
        for kind in StrategyKind::PRIORITY {
            let cfg = self.config.strategy(kind);
            if !cfg.enabled {
                debug!(strategy = kind.key(), "Strategy disabled, skipping");
                continue;
            }
            match kind.evaluate(snapshot, &cfg.params) {
                Ok(signal) => {
                    debug!(
                        pair = %snapshot.pair,
                        strategy = kind.key(),
                        direction = %signal.direction,
                        confidence = signal.confidence,
                        "Strategy vote"
                    );
                    votes.push(signal);
                }
                Err(e) => {
                    warn!(
                        pair = %snapshot.pair,
                        strategy = kind.key(),
                        error = %e,
                        "Strategy misconfigured, excluded from this round"
                    );
                }
            }
        }

        let participants = votes.len() as u32;
        let buys = count(&votes, Direction::Buy);
        let sells = count(&votes, Direction::Sell);

        let (winner, score) = if buys > sells {
            (Direction::Buy, buys)
        } else if sells > buys {
            (Direction::Sell, sells)
        } else {
            (Direction::Neutral, 0)
        };

        let direction = if winner.is_actionable() && score < self.config.minimum_confluence {
            debug!(
                pair = %snapshot.pair,
                score,
                minimum = self.config.minimum_confluence,
                "Confluence below minimum, no trade"
            );
            Direction::Neutral
        } else {
            winner
        };

        let mut decision = ConfluenceDecision {
            pair: snapshot.pair.clone(),
            timeframe: snapshot.timeframe.clone(),
            entry_price,
            direction,
            score,
            participants,
            contributing_signals: Vec::new(),
            votes,
            risk_reward_ratio: None,
            stop_loss: None,
            take_profit: None,
        };

        if direction.is_actionable() {
            decision.contributing_signals = decision
                .votes
                .iter()
                .filter(|s| s.direction == direction)
                .cloned()
                .collect();
            let (take_profit, stop_loss) = match direction {
                Direction::Buy => (
                    nearest_above(&snapshot.sr_levels, entry_price, LevelKind::Resistance),
                    nearest_below(&snapshot.sr_levels, entry_price, LevelKind::Support),
                ),
                _ => (
                    nearest_below(&snapshot.sr_levels, entry_price, LevelKind::Support),
                    nearest_above(&snapshot.sr_levels, entry_price, LevelKind::Resistance),
                ),
            };
            decision.take_profit = take_profit.map(|l| l.price);
            decision.stop_loss = stop_loss.map(|l| l.price);
            decision.risk_reward_ratio =
                risk_reward(entry_price, decision.take_profit, decision.stop_loss);
        }

        decision
    }
}

fn count(votes: &[StrategySignal], direction: Direction) -> u32 {
    votes.iter().filter(|s| s.direction == direction).count() as u32
}

/// `|tp - entry| / |entry - sl|`; absent without both levels or with zero risk.
pub fn risk_reward(entry: f64, take_profit: Option<f64>, stop_loss: Option<f64>) -> Option<f64> {
    let (tp, sl) = (take_profit?, stop_loss?);
    let risk = (entry - sl).abs();
    if risk == 0.0 {
        return None;
    }
    Some((tp - entry).abs() / risk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::levels::SrLevel;
    use crate::strategies::testing::{flat_snapshot, set_latest, set_previous};
    use common::OrderSide;
    use std::collections::HashMap;

    fn config(minimum: u32) -> StrategyFileConfig {
        StrategyFileConfig {
            minimum_confluence: minimum,
            ..StrategyFileConfig::default()
        }
    }

    fn disabled() -> StrategyConfig {
        StrategyConfig {
            enabled: false,
            params: HashMap::new(),
        }
    }

    fn level(price: f64, kind: LevelKind) -> SrLevel {
        SrLevel { price, kind, strength: 2, touches: 2 }
    }

    /// Close 100; RSI 25, ADX 30 and a bullish EMA stack.
    fn bullish_snapshot() -> MarketSnapshot {
        let mut snap = flat_snapshot(40);
        let ind = &mut snap.indicators;
        set_latest(&mut ind.rsi, 25.0);
        set_latest(&mut ind.adx, 30.0);
        set_latest(&mut ind.ema_9, 99.0);
        set_latest(&mut ind.ema_21, 98.0);
        set_latest(&mut ind.ema_50, 97.0);
        set_latest(&mut ind.ema_200, 96.0);
        snap.sr_levels = vec![
            level(94.0, LevelKind::Support),
            level(98.0, LevelKind::Support),
            level(104.0, LevelKind::Resistance),
            level(110.0, LevelKind::Resistance),
        ];
        snap
    }

    #[test]
    fn technical_and_trend_agree_on_buy() {
        let cfg = config(2);
        let decision = ConfluenceAggregator::new(&cfg).decide(&bullish_snapshot());
        assert_eq!(decision.direction, Direction::Buy);
        assert_eq!(decision.score, 2);
        assert_eq!(decision.participants, 4);
        let kinds: Vec<_> = decision.contributing_signals.iter().map(|s| s.strategy).collect();
        assert_eq!(kinds, vec![StrategyKind::Trend, StrategyKind::Technical]);
        assert_eq!(decision.take_profit, Some(104.0));
        assert_eq!(decision.stop_loss, Some(98.0));
        assert_eq!(decision.risk_reward_ratio, Some(2.0));
        assert_eq!(decision.entry_price, 100.0);
    }

    #[test]
    fn score_below_minimum_forces_none() {
        let cfg = config(3);
        let decision = ConfluenceAggregator::new(&cfg).decide(&bullish_snapshot());
        assert_eq!(decision.direction, Direction::Neutral);
        assert_eq!(decision.score, 2);
        assert!(decision.contributing_signals.is_empty());
        assert!(decision.trade_request().is_none());
    }

    #[test]
    fn two_against_two_is_none() {
        // Trend + Scalping read BUY from the EMAs and a volume spike;
        // Technical (overbought) and PriceAction (shooting star under
        // resistance) read SELL.
        let mut snap = bullish_snapshot();
        let n = snap.candles.len();
        let prev = &mut snap.candles[n - 2];
        (prev.open, prev.high, prev.low, prev.close) = (99.0, 100.0, 98.5, 99.8);
        let last = &mut snap.candles[n - 1];
        (last.open, last.high, last.low, last.close) = (100.0, 102.5, 99.9, 100.5);
        last.volume = 5_000.0;
        snap.sr_levels.push(level(100.8, LevelKind::Resistance));

        let ind = &mut snap.indicators;
        set_latest(&mut ind.rsi, 75.0);
        set_previous(&mut ind.ema_9, 99.5);
        set_previous(&mut ind.ema_21, 99.7);
        set_latest(&mut ind.ema_9, 99.9);
        set_latest(&mut ind.ema_21, 99.8);

        let cfg = config(1);
        let decision = ConfluenceAggregator::new(&cfg).decide(&snap);
        let votes: Vec<_> = decision.votes.iter().map(|s| (s.strategy, s.direction)).collect();
        assert_eq!(
            votes,
            vec![
                (StrategyKind::Trend, Direction::Buy),
                (StrategyKind::Technical, Direction::Sell),
                (StrategyKind::PriceAction, Direction::Sell),
                (StrategyKind::Scalping, Direction::Buy),
            ]
        );
        assert_eq!(decision.direction, Direction::Neutral);
        assert_eq!(decision.score, 0);
        assert!(decision.trade_request().is_none());
    }

    #[test]
    fn no_votes_is_none() {
        let cfg = config(1);
        let decision = ConfluenceAggregator::new(&cfg).decide(&flat_snapshot(40));
        assert_eq!(decision.direction, Direction::Neutral);
        assert_eq!(decision.score, 0);
        assert_eq!(decision.participants, 4);
    }

    #[test]
    fn disabled_strategies_do_not_participate() {
        let cfg = config(1)
            .with_strategy(StrategyKind::Trend, disabled())
            .with_strategy(StrategyKind::Scalping, disabled());
        let decision = ConfluenceAggregator::new(&cfg).decide(&bullish_snapshot());
        assert_eq!(decision.participants, 2);
        assert_eq!(decision.direction, Direction::Buy);
        assert_eq!(decision.score, 1);
    }

    #[test]
    fn misconfigured_strategy_is_excluded() {
        let mut params = HashMap::new();
        params.insert("rsi_oversold".to_string(), toml::Value::String("low".into()));
        let cfg = config(1).with_strategy(
            StrategyKind::Technical,
            StrategyConfig {
                enabled: true,
                params,
            },
        );
        let decision = ConfluenceAggregator::new(&cfg).decide(&bullish_snapshot());
        assert_eq!(decision.participants, 3);
        assert_eq!(decision.score, 1);
        assert_eq!(decision.contributing_signals[0].strategy, StrategyKind::Trend);
    }

    #[test]
    fn missing_stop_level_leaves_ratio_absent() {
        let mut snap = bullish_snapshot();
        snap.sr_levels.retain(|l| l.kind == LevelKind::Resistance);
        let cfg = config(2);
        let decision = ConfluenceAggregator::new(&cfg).decide(&snap);
        assert_eq!(decision.direction, Direction::Buy);
        assert_eq!(decision.take_profit, Some(104.0));
        assert_eq!(decision.stop_loss, None);
        assert_eq!(decision.risk_reward_ratio, None);
    }

    #[test]
    fn trade_request_carries_decision() {
        let cfg = config(2);
        let decision = ConfluenceAggregator::new(&cfg).decide(&bullish_snapshot());
        let request = decision.trade_request().unwrap();
        assert_eq!(request.side, OrderSide::Buy);
        assert_eq!(request.strategy, "Trend Following + Technical Analysis");
        assert_eq!(request.confluence_score, 2);
        assert_eq!(request.stop_loss, Some(98.0));
    }

    #[test]
    fn risk_reward_edge_cases() {
        assert_eq!(risk_reward(100.0, Some(110.0), Some(95.0)), Some(2.0));
        assert_eq!(risk_reward(100.0, Some(110.0), Some(100.0)), None);
        assert_eq!(risk_reward(100.0, None, Some(95.0)), None);
    }
}
