use async_trait::async_trait;

use crate::{Explanation, PostAnalysis, Result, Trade, TradeRequest};

/// The paper-trade bookkeeping collaborator.
///
/// The decision engine only ever talks to the ledger through this trait.
/// `PaperLedger` in `crates/paper` is the in-memory implementation.
#[async_trait]
pub trait PaperTradeLedger: Send + Sync {
    /// Open a trade with its frozen explanation. `Ok(None)` means the ledger
    /// declined it (pair already open, position cap reached).
    async fn open_trade(
        &self,
        request: TradeRequest,
        explanation: Explanation,
    ) -> Result<Option<Trade>>;

    /// Close every open trade on `pair` whose stop-loss or take-profit has
    /// been touched by `price`. Returns the trades closed by this call.
    async fn check_open_trades(&self, pair: &str, price: f64) -> Result<Vec<Trade>>;

    /// Close an open trade at `price` regardless of its levels.
    async fn close_trade(&self, trade_id: &str, price: f64) -> Result<Trade>;

    /// Attach the retrospective to a closed trade. Fails if the trade is
    /// still open or already has one.
    async fn attach_post_analysis(&self, trade_id: &str, analysis: PostAnalysis) -> Result<()>;

    async fn trade(&self, trade_id: &str) -> Result<Option<Trade>>;

    async fn explanation(&self, trade_id: &str) -> Result<Option<Explanation>>;

    async fn post_analysis(&self, trade_id: &str) -> Result<Option<PostAnalysis>>;

    async fn open_trades(&self) -> Result<Vec<Trade>>;
}
