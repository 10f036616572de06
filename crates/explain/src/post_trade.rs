use std::collections::BTreeMap;

use tracing::debug;

use common::{CloseReason, Error, Explanation, OrderSide, PostAnalysis, Result, Trade};

use crate::format_price;

const ADX_TREND_FLOOR: f64 = 25.0;
const MIN_RISK_REWARD: f64 = 1.5;
const LARGE_LOSS_PCT: f64 = 2.0;
const SMALL_PROFIT_PCT: f64 = 1.0;

/// An entry indicator that had moved against the position by exit time.
#[derive(Debug, Clone, PartialEq)]
struct Reversal {
    indicator: &'static str,
    detail: String,
}

/// Reviews a closed trade against the explanation it was opened with.
#[derive(Debug, Clone, Copy)]
pub struct PostTradeAnalyzer {
    minimum_confluence: u32,
}

impl PostTradeAnalyzer {
    pub fn new(minimum_confluence: u32) -> Self {
        Self { minimum_confluence }
    }

    /// `exit_indicators` are the latest indicator values when the trade
    /// closed, keyed like the explanation's `indicators`.
    pub fn analyze(
        &self,
        trade: &Trade,
        explanation: &Explanation,
        exit_indicators: &BTreeMap<String, f64>,
    ) -> Result<PostAnalysis> {
        if trade.is_open() {
            return Err(Error::InvalidState(format!(
                "trade {} is still open, nothing to review",
                trade.id
            )));
        }
        let exit = trade.exit_price.ok_or_else(|| {
            Error::InvalidState(format!("closed trade {} has no exit price", trade.id))
        })?;
        let reason = CloseReason::infer(trade).unwrap_or(CloseReason::Manual);
        let (computed_pnl, computed_pct) = trade.pnl_at(exit);
        let pnl = trade.pnl.unwrap_or(computed_pnl);
        let pnl_pct = trade.pnl_percent.unwrap_or(computed_pct);

        let result_summary = format!(
            "{reason}: {} {} {} -> {}, PnL {pnl:+.2} ({pnl_pct:+.2}%)",
            trade.side,
            trade.pair,
            format_price(trade.entry_price),
            format_price(exit),
        );

        let reversals = if reason == CloseReason::StopLoss {
            find_reversals(trade.side, exit, &explanation.indicators, exit_indicators)
        } else {
            Vec::new()
        };

        let mut what_went_right = Vec::new();
        let mut what_went_wrong = Vec::new();
        match reason {
            CloseReason::TakeProfit => {
                what_went_right.extend(explanation.reasons.iter().cloned());
                what_went_right.push(format!(
                    "Price reached the target at {} as planned",
                    format_price(exit)
                ));
            }
            CloseReason::StopLoss => {
                if reversals.is_empty() {
                    what_went_wrong.push(
                        "The signal failed to follow through: none of the entry indicators \
                         had clearly reversed, price simply did not move in the expected direction"
                            .to_string(),
                    );
                } else {
                    what_went_wrong.extend(reversals.iter().map(|r| r.detail.clone()));
                }
                what_went_right.push(format!(
                    "The stop-loss capped the loss at {pnl_pct:+.2}% instead of letting it run"
                ));
            }
            CloseReason::Manual => {
                if pnl >= 0.0 {
                    what_went_right
                        .push(format!("Closed manually in profit ({pnl_pct:+.2}%)"));
                } else {
                    what_went_wrong
                        .push(format!("Closed manually at a loss ({pnl_pct:+.2}%)"));
                }
            }
        }

        let improvements = self.improvements(trade, explanation, pnl, pnl_pct);

        let lesson = if let Some(first) = reversals.first() {
            format!(
                "{} turned against the trade before the stop was hit, and once the indicator \
                 that justified entry reverses the setup is no longer valid.",
                first.indicator
            )
        } else if let Some(first) = improvements.first() {
            first.clone()
        } else if pnl >= 0.0 {
            "A plan with a defined target and stop, followed through, is what produces \
             consistent results."
                .to_string()
        } else {
            "Losses are part of trading, and respecting the stop kept this one small.".to_string()
        };

        debug!(
            trade_id = %trade.id,
            reason = ?reason,
            reversals = reversals.len(),
            improvements = improvements.len(),
            "Post-trade analysis produced"
        );

        Ok(PostAnalysis {
            result_summary,
            what_went_right,
            what_went_wrong,
            improvements,
            lesson,
        })
    }

    fn improvements(
        &self,
        trade: &Trade,
        explanation: &Explanation,
        pnl: f64,
        pnl_pct: f64,
    ) -> Vec<String> {
        let mut out = Vec::new();
        if trade.confluence_score == self.minimum_confluence {
            out.push(format!(
                "Confluence was {}, exactly the minimum required, so waiting for one more \
                 strategy to agree would filter out marginal setups.",
                trade.confluence_score
            ));
        } else if trade.confluence_score < self.minimum_confluence {
            out.push(format!(
                "Confluence was {}, below the current minimum of {}, so this setup would \
                 not qualify for a trade today.",
                trade.confluence_score, self.minimum_confluence
            ));
        }
        if trade.stop_loss.is_none() {
            out.push(
                "No stop-loss level was set, so define where the idea is wrong before entering."
                    .to_string(),
            );
        }
        if let Some(rr) = explanation.risk_reward_ratio {
            if rr < MIN_RISK_REWARD {
                out.push(format!(
                    "Risk:reward was 1:{rr:.2}, so prefer setups offering at least 1:{MIN_RISK_REWARD}."
                ));
            }
        }
        if pnl < 0.0 && pnl_pct < -LARGE_LOSS_PCT {
            out.push(format!(
                "The loss ({pnl_pct:+.2}%) exceeded {LARGE_LOSS_PCT}%, and a tighter stop or \
                 a smaller position would have limited it."
            ));
        }
        if pnl > 0.0 && pnl_pct < SMALL_PROFIT_PCT {
            out.push(format!(
                "The profit ({pnl_pct:+.2}%) was under {SMALL_PROFIT_PCT}%, so check whether \
                 the take-profit left enough room for the move."
            ));
        }
        out
    }
}

/// Entry indicators whose exit reading contradicts the trade's side.
fn find_reversals(
    side: OrderSide,
    exit_price: f64,
    entry: &BTreeMap<String, f64>,
    exit: &BTreeMap<String, f64>,
) -> Vec<Reversal> {
    let long = side == OrderSide::Buy;
    let pair = |key: &str| Some((*entry.get(key)?, *exit.get(key)?));
    let mut out = Vec::new();

    if let Some((at_entry, at_exit)) = pair("rsi") {
        if (long && at_exit < at_entry) || (!long && at_exit > at_entry) {
            out.push(Reversal {
                indicator: "RSI",
                detail: format!(
                    "RSI kept moving against the trade ({at_entry:.1} at entry, {at_exit:.1} at exit)"
                ),
            });
        }
    }

    if let Some((at_entry, at_exit)) = pair("macd_histogram") {
        if (long && at_exit < 0.0) || (!long && at_exit > 0.0) {
            out.push(Reversal {
                indicator: "MACD",
                detail: format!(
                    "MACD histogram flipped against the trade ({at_entry:.4} at entry, {at_exit:.4} at exit)"
                ),
            });
        }
    }

    if let (Some((_, fast)), Some((_, slow))) = (pair("ema_9"), pair("ema_21")) {
        if (long && fast < slow) || (!long && fast > slow) {
            let relation = if long { "below" } else { "above" };
            out.push(Reversal {
                indicator: "EMA",
                detail: format!(
                    "EMA9 ({fast:.2}) crossed {relation} EMA21 ({slow:.2}): short-term momentum turned"
                ),
            });
        }
    }

    if let Some((_, ema_200)) = pair("ema_200") {
        if (long && exit_price < ema_200) || (!long && exit_price > ema_200) {
            let relation = if long { "below" } else { "above" };
            out.push(Reversal {
                indicator: "EMA200",
                detail: format!(
                    "Price closed {relation} EMA200 ({ema_200:.2}): the long-term trend no longer supports the trade"
                ),
            });
        }
    }

    if let Some((at_entry, at_exit)) = pair("adx") {
        if at_exit < ADX_TREND_FLOOR && at_exit < at_entry {
            out.push(Reversal {
                indicator: "ADX",
                detail: format!(
                    "ADX fell from {at_entry:.1} to {at_exit:.1}: the trend lost its strength"
                ),
            });
        }
    }

    let level = if long { "support" } else { "resistance" };
    if let Some(price) = entry.get(level) {
        if (long && exit_price < *price) || (!long && exit_price > *price) {
            out.push(Reversal {
                indicator: if long { "Support" } else { "Resistance" },
                detail: format!("Price broke through the {level} at {}", format_price(*price)),
            });
        }
    }

    out
}
