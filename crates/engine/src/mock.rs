use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use common::{timeframe_minutes, Candle, CandleProvider, Error, Result};

const START_PRICE: f64 = 65_000.0;
const BASE_VOLUME: f64 = 1_000.0;

struct Walk {
    rng: StdRng,
    candles: Vec<Candle>,
}

/// Seeded random-walk candles. The same seed and pair always produce the
/// same history; later fetches extend it bar by bar as time passes.
pub struct MockCandles {
    seed: u64,
    walks: Mutex<HashMap<(String, String), Walk>>,
}

impl MockCandles {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            walks: Mutex::new(HashMap::new()),
        }
    }

    /// Closed candles up to `now`, at most `limit` of them.
    pub async fn candles_at(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let minutes = timeframe_minutes(timeframe)
            .ok_or_else(|| Error::Config(format!("unsupported timeframe '{timeframe}'")))?;
        let step = minutes * 60;
        // Open time of the newest fully closed bar.
        let last_open = (now.timestamp().div_euclid(step) - 1) * step;

        let mut walks = self.walks.lock().await;
        let walk = walks
            .entry((pair.to_string(), timeframe.to_string()))
            .or_insert_with(|| Walk {
                rng: StdRng::seed_from_u64(self.seed ^ pair_hash(pair)),
                candles: Vec::new(),
            });

        let mut next_open = match walk.candles.last() {
            Some(c) => c.timestamp.timestamp() + step,
            None => last_open - step * (limit.max(1) as i64 - 1),
        };
        while next_open <= last_open {
            let prev_close = walk.candles.last().map_or(START_PRICE, |c| c.close);
            let timestamp = Utc
                .timestamp_opt(next_open, 0)
                .single()
                .ok_or_else(|| Error::Other(format!("invalid timestamp {next_open}")))?;
            let candle = next_candle(&mut walk.rng, prev_close, timestamp);
            walk.candles.push(candle);
            next_open += step;
        }

        let n = walk.candles.len();
        Ok(walk.candles[n.saturating_sub(limit)..].to_vec())
    }
}

#[async_trait]
impl CandleProvider for MockCandles {
    async fn fetch_candles(&self, pair: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.candles_at(pair, timeframe, limit, Utc::now()).await
    }
}

fn next_candle(rng: &mut StdRng, open: f64, timestamp: DateTime<Utc>) -> Candle {
    // Slight upward drift, occasional volume bursts.
    let change: f64 = rng.gen_range(-0.0085..0.0087);
    let close = (open * (1.0 + change)).max(0.01);
    let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.003));
    let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.003));
    let burst = if rng.gen_bool(0.05) { rng.gen_range(2.0..4.0) } else { 1.0 };
    let volume = BASE_VOLUME * (1.0 + rng.gen_range(0.0..0.5)) * burst;
    Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// FNV-1a, so each pair walks its own path under one seed.
fn pair_hash(pair: &str) -> u64 {
    pair.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::validate_candles;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn same_seed_same_history() {
        let a = MockCandles::new(7).candles_at("BTCUSDT", "15m", 50, at(12, 5)).await.unwrap();
        let b = MockCandles::new(7).candles_at("BTCUSDT", "15m", 50, at(12, 5)).await.unwrap();
        assert_eq!(a, b);
        let c = MockCandles::new(8).candles_at("BTCUSDT", "15m", 50, at(12, 5)).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn history_is_closed_and_ordered() {
        let candles = MockCandles::new(1)
            .candles_at("ETHUSDT", "15m", 20, at(12, 5))
            .await
            .unwrap();
        assert_eq!(candles.len(), 20);
        validate_candles(&candles).unwrap();
        // 12:05 -> newest closed bar opened at 11:45
        assert_eq!(candles.last().unwrap().timestamp, at(11, 45));
        assert!(candles.iter().all(|c| c.low <= c.open.min(c.close) && c.high >= c.open.max(c.close)));
    }

    #[tokio::test]
    async fn later_fetch_extends_same_walk() {
        let mock = MockCandles::new(3);
        let first = mock.candles_at("BTCUSDT", "15m", 10, at(12, 5)).await.unwrap();
        let second = mock.candles_at("BTCUSDT", "15m", 10, at(12, 35)).await.unwrap();
        assert_eq!(second.len(), 10);
        assert_eq!(second[..8], first[2..]);
        assert_eq!(second.last().unwrap().timestamp, at(12, 15));
    }

    #[tokio::test]
    async fn unknown_timeframe_is_rejected() {
        let err = MockCandles::new(1).candles_at("BTCUSDT", "7x", 10, at(12, 0)).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
