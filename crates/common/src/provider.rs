use async_trait::async_trait;

use crate::{Candle, Result};

/// Abstraction over the market-data connection.
///
/// `BinanceKlines` implements this against the public REST API,
/// `MockCandles` with a seeded random walk. Callers apply their own
/// timeout; implementations must not retry indefinitely.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Return up to `limit` most recent closed candles, oldest first.
    async fn fetch_candles(&self, pair: &str, timeframe: &str, limit: usize)
        -> Result<Vec<Candle>>;
}
