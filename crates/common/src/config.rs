use std::time::Duration;

use crate::{timeframe_minutes, Error, Result};

/// Where candles come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Seeded random walk, fully reproducible.
    Mock,
    /// Binance public REST klines (no credentials needed).
    Binance,
}

/// Process configuration loaded from environment variables at startup.
/// Strategy thresholds live in the strategy file, not here.
#[derive(Debug, Clone)]
pub struct Config {
    // Market
    pub pairs: Vec<String>,
    pub timeframe: String,
    pub candle_limit: usize,
    pub data_source: DataSource,
    pub mock_seed: u64,
    pub binance_base_url: String,

    // Cycle
    pub scan_interval: Duration,
    pub fetch_timeout: Duration,
    pub stale_tolerance: Duration,
    pub trade_cooldown: Duration,

    // Paper ledger
    pub initial_balance: f64,
    pub position_size_pct: f64,
    pub max_open_trades: usize,

    // Ledger retry
    pub ledger_retry_attempts: u32,
    pub ledger_retry_base: Duration,

    // Notifications
    pub notification_capacity: usize,

    // Strategy config file path
    pub strategy_config_path: String,
    /// Optional TOML file overriding the built-in concept glossary.
    pub glossary_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pairs: vec!["BTCUSDT".to_string()],
            timeframe: "15m".to_string(),
            candle_limit: 250,
            data_source: DataSource::Mock,
            mock_seed: 42,
            binance_base_url: "https://api.binance.com".to_string(),
            scan_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            stale_tolerance: Duration::from_secs(2 * 15 * 60),
            trade_cooldown: Duration::from_secs(300),
            initial_balance: 10_000.0,
            position_size_pct: 5.0,
            max_open_trades: 3,
            ledger_retry_attempts: 3,
            ledger_retry_base: Duration::from_millis(200),
            notification_capacity: 256,
            strategy_config_path: "config/strategies.toml".to_string(),
            glossary_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present. Every variable is optional; a present but
    /// malformed value is an error.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        let defaults = Config::default();

        let pairs: Vec<String> = match optional_env("PAIRS") {
            Some(raw) => raw
                .split(',')
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            None => defaults.pairs.clone(),
        };
        if pairs.is_empty() {
            return Err(Error::Config("PAIRS must name at least one pair".into()));
        }

        let timeframe = optional_env("TIMEFRAME").unwrap_or(defaults.timeframe.clone());
        let tf_minutes = timeframe_minutes(&timeframe).ok_or_else(|| {
            Error::Config(format!("TIMEFRAME '{timeframe}' is not a valid timeframe"))
        })?;

        let data_source = match optional_env("DATA_SOURCE")
            .unwrap_or_else(|| "mock".to_string())
            .to_lowercase()
            .as_str()
        {
            "mock" => DataSource::Mock,
            "binance" => DataSource::Binance,
            other => {
                return Err(Error::Config(format!(
                    "DATA_SOURCE must be 'mock' or 'binance', got: '{other}'"
                )))
            }
        };

        let stale_tolerance = match parsed_env::<u64>("STALE_TOLERANCE_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(2 * tf_minutes as u64 * 60),
        };

        let position_size_pct =
            parsed_env::<f64>("POSITION_SIZE_PCT")?.unwrap_or(defaults.position_size_pct);
        if !(position_size_pct > 0.0 && position_size_pct <= 100.0) {
            return Err(Error::Config(format!(
                "POSITION_SIZE_PCT must be in (0, 100], got {position_size_pct}"
            )));
        }

        let notification_capacity = parsed_env::<usize>("NOTIFICATION_CAPACITY")?
            .unwrap_or(defaults.notification_capacity);
        if notification_capacity == 0 {
            return Err(Error::Config("NOTIFICATION_CAPACITY must be at least 1".into()));
        }

        Ok(Config {
            pairs,
            timeframe,
            candle_limit: parsed_env("CANDLE_LIMIT")?.unwrap_or(defaults.candle_limit),
            data_source,
            mock_seed: parsed_env("MOCK_SEED")?.unwrap_or(defaults.mock_seed),
            binance_base_url: optional_env("BINANCE_BASE_URL")
                .unwrap_or(defaults.binance_base_url),
            scan_interval: parsed_env("SCAN_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_interval),
            fetch_timeout: parsed_env("FETCH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            stale_tolerance,
            trade_cooldown: parsed_env("TRADE_COOLDOWN_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.trade_cooldown),
            initial_balance: parsed_env("INITIAL_BALANCE")?.unwrap_or(defaults.initial_balance),
            position_size_pct,
            max_open_trades: parsed_env("MAX_OPEN_TRADES")?.unwrap_or(defaults.max_open_trades),
            ledger_retry_attempts: parsed_env("LEDGER_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.ledger_retry_attempts),
            ledger_retry_base: parsed_env("LEDGER_RETRY_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.ledger_retry_base),
            notification_capacity,
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or(defaults.strategy_config_path),
            glossary_path: optional_env("GLOSSARY_PATH"),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.pairs, vec!["BTCUSDT".to_string()]);
        assert_eq!(c.timeframe, "15m");
        assert_eq!(c.stale_tolerance, Duration::from_secs(1800));
        assert_eq!(c.max_open_trades, 3);
        assert_eq!(c.data_source, DataSource::Mock);
    }

    #[test]
    fn parsed_env_rejects_garbage() {
        std::env::set_var("MENTORBOT_TEST_GARBAGE", "not-a-number");
        let parsed: Result<Option<u64>> = parsed_env("MENTORBOT_TEST_GARBAGE");
        assert!(matches!(parsed, Err(Error::Config(_))));
        std::env::remove_var("MENTORBOT_TEST_GARBAGE");

        let missing: Result<Option<u64>> = parsed_env("MENTORBOT_TEST_MISSING");
        assert!(matches!(missing, Ok(None)));
    }
}
