use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use tracing::debug;

use common::Explanation;
use strategy::{ConfluenceDecision, StrategySignal};

use crate::format_price;
use crate::glossary::ConceptGlossary;

/// Turns a decision into the frozen, glossary-linked explanation stored with
/// the trade. Pure: the same decision and glossary always render the same
/// text.
pub struct ExplanationGenerator<'a> {
    glossary: &'a dyn ConceptGlossary,
}

impl<'a> ExplanationGenerator<'a> {
    pub fn new(glossary: &'a dyn ConceptGlossary) -> Self {
        Self { glossary }
    }

    pub fn generate(&self, decision: &ConfluenceDecision) -> Explanation {
        let Some(side) = decision.direction.side() else {
            return Explanation::default();
        };
        // contributing_signals is already in priority order.
        let signals = &decision.contributing_signals;

        let reasons: Vec<String> = signals
            .iter()
            .flat_map(|s| {
                s.reasons
                    .iter()
                    .map(move |r| format!("{}: {}", s.strategy_name, r.text))
            })
            .collect();

        let mut seen = HashSet::new();
        let mut learning_points = Vec::new();
        for reason in signals.iter().flat_map(|s| &s.reasons) {
            if !seen.insert(reason.concept) {
                continue;
            }
            match self.glossary.concept(reason.concept) {
                Some(entry) => learning_points.push(format!("{}: {}", entry.name, entry.short)),
                None => debug!(concept = %reason.concept, "No glossary entry for concept"),
            }
        }

        let mut indicators = BTreeMap::new();
        for signal in signals {
            for (key, value) in &signal.indicator_snapshot {
                indicators.entry(key.clone()).or_insert(*value);
            }
        }
        indicators.insert("entry_price".to_string(), decision.entry_price);

        let mut text = String::new();
        let _ = writeln!(
            text,
            "{side} {} @ {} ({})",
            decision.pair,
            format_price(decision.entry_price),
            decision.timeframe
        );
        if let Some(leader) = leading_signal(signals) {
            let _ = writeln!(
                text,
                "Led by {}, {}/{} strategies agree (confluence {}).",
                leader.strategy_name, decision.score, decision.participants, decision.score
            );
        }
        text.push_str("\nWhy:\n");
        for (i, reason) in reasons.iter().enumerate() {
            let _ = writeln!(text, "{}. {reason}", i + 1);
        }
        text.push('\n');
        match (decision.risk_reward_ratio, decision.stop_loss, decision.take_profit) {
            (Some(rr), Some(sl), Some(tp)) => {
                let _ = write!(
                    text,
                    "Risk:Reward 1:{rr:.2} (stop {}, target {})",
                    format_price(sl),
                    format_price(tp)
                );
            }
            _ => text.push_str("Risk:Reward n/a (no stop-loss or take-profit level found)"),
        }

        Explanation {
            full_text: text,
            reasons,
            learning_points,
            risk_reward_ratio: decision.risk_reward_ratio,
            indicators,
        }
    }
}

/// Highest confidence wins; on equal confidence the earlier (higher
/// priority) signal is kept.
fn leading_signal(signals: &[StrategySignal]) -> Option<&StrategySignal> {
    signals.iter().fold(None, |best: Option<&StrategySignal>, s| match best {
        Some(b) if b.confidence >= s.confidence => Some(b),
        _ => Some(s),
    })
}
