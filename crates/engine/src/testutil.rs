//! Fakes shared by the engine tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{
    Candle, CandleProvider, Error, Explanation, PaperTradeLedger, PostAnalysis, Result, Trade,
    TradeRequest,
};
use paper::PaperLedger;
use strategy::{StrategyConfig, StrategyFileConfig, StrategyKind};

pub const STEP_MINUTES: i64 = 15;

/// Steadily rising closes whose newest 15m bar closed exactly at `end`.
pub fn rising(n: usize, end: DateTime<Utc>) -> Vec<Candle> {
    let first_open = end - chrono::Duration::minutes(STEP_MINUTES * n as i64);
    (0..n)
        .map(|i| {
            let open = 100.0 * 1.002f64.powi(i as i32);
            let close = open * 1.002;
            Candle {
                timestamp: first_open + chrono::Duration::minutes(STEP_MINUTES * i as i64),
                open,
                high: close * 1.0005,
                low: open * 0.9995,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Serves the same history on every fetch, optionally after a delay.
pub struct FixedCandles {
    pub candles: Vec<Candle>,
    pub delay: Option<Duration>,
}

#[async_trait]
impl CandleProvider for FixedCandles {
    async fn fetch_candles(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.candles.clone())
    }
}

/// A rising history that always ends at the wall clock, so it is never stale.
pub struct LiveCandles;

#[async_trait]
impl CandleProvider for LiveCandles {
    async fn fetch_candles(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>> {
        Ok(rising(230, Utc::now()))
    }
}

/// Fails `open_trade` while `outages` is above zero and `explanation` while
/// `explanation_outages` is, otherwise delegates.
pub struct FlakyLedger {
    pub inner: PaperLedger,
    pub outages: AtomicU32,
    pub explanation_outages: AtomicU32,
}

impl FlakyLedger {
    pub fn new(inner: PaperLedger, outages: u32) -> Self {
        Self {
            inner,
            outages: AtomicU32::new(outages),
            explanation_outages: AtomicU32::new(0),
        }
    }

    pub fn fail_explanations(&self, times: u32) {
        self.explanation_outages.store(times, Ordering::SeqCst);
    }
}

fn take_outage(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PaperTradeLedger for FlakyLedger {
    async fn open_trade(
        &self,
        request: TradeRequest,
        explanation: Explanation,
    ) -> Result<Option<Trade>> {
        if take_outage(&self.outages) {
            return Err(Error::Ledger("database unavailable".into()));
        }
        self.inner.open_trade(request, explanation).await
    }

    async fn check_open_trades(&self, pair: &str, price: f64) -> Result<Vec<Trade>> {
        self.inner.check_open_trades(pair, price).await
    }

    async fn close_trade(&self, trade_id: &str, price: f64) -> Result<Trade> {
        self.inner.close_trade(trade_id, price).await
    }

    async fn attach_post_analysis(&self, trade_id: &str, analysis: PostAnalysis) -> Result<()> {
        self.inner.attach_post_analysis(trade_id, analysis).await
    }

    async fn trade(&self, trade_id: &str) -> Result<Option<Trade>> {
        self.inner.trade(trade_id).await
    }

    async fn explanation(&self, trade_id: &str) -> Result<Option<Explanation>> {
        if take_outage(&self.explanation_outages) {
            return Err(Error::Ledger("database unavailable".into()));
        }
        self.inner.explanation(trade_id).await
    }

    async fn post_analysis(&self, trade_id: &str) -> Result<Option<PostAnalysis>> {
        self.inner.post_analysis(trade_id).await
    }

    async fn open_trades(&self) -> Result<Vec<Trade>> {
        self.inner.open_trades().await
    }
}

/// Only the trend strategy votes, and one vote is enough.
pub fn trend_only() -> StrategyFileConfig {
    let mut cfg = StrategyFileConfig {
        minimum_confluence: 1,
        ..StrategyFileConfig::default()
    };
    for kind in [
        StrategyKind::Technical,
        StrategyKind::PriceAction,
        StrategyKind::Scalping,
    ] {
        cfg = cfg.with_strategy(
            kind,
            StrategyConfig {
                enabled: false,
                ..StrategyConfig::default()
            },
        );
    }
    cfg
}
