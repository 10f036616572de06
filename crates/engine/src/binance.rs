use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use common::{CandleProvider, Candle, Error, Result};

/// Binance public REST klines. No credentials needed.
pub struct BinanceKlines {
    base_url: String,
    http: Client,
}

impl BinanceKlines {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl CandleProvider for BinanceKlines {
    async fn fetch_candles(&self, pair: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        // One extra row: the still-forming candle is dropped below.
        let url = format!(
            "{}/api/v3/klines?symbol={pair}&interval={timeframe}&limit={}",
            self.base_url,
            (limit + 1).min(1000)
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }

        let mut candles = parse_klines(&body, Utc::now().timestamp_millis())?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!(pair, timeframe, count = candles.len(), "Fetched klines");
        Ok(candles)
    }
}

/// Parse a `/api/v3/klines` body, keeping only candles closed by `now_ms`.
///
/// Each row is `[open_time, "open", "high", "low", "close", "volume",
/// close_time, ...]`.
pub fn parse_klines(body: &str, now_ms: i64) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() < 7 {
            return Err(Error::Exchange(format!("kline row has {} fields", row.len())));
        }
        let close_time = int_field(&row[6], "close_time")?;
        if close_time > now_ms {
            continue;
        }
        let open_time = int_field(&row[0], "open_time")?;
        let timestamp = Utc
            .timestamp_millis_opt(open_time)
            .single()
            .ok_or_else(|| Error::Exchange(format!("invalid open time {open_time}")))?;
        candles.push(Candle {
            timestamp,
            open: str_field(&row[1], "open")?,
            high: str_field(&row[2], "high")?,
            low: str_field(&row[3], "low")?,
            close: str_field(&row[4], "close")?,
            volume: str_field(&row[5], "volume")?,
        });
    }
    Ok(candles)
}

fn int_field(value: &Value, name: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::Exchange(format!("kline field '{name}' is not an integer")))
}

fn str_field(value: &Value, name: &str) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Error::Exchange(format!("kline field '{name}' is not a decimal string")))
}
