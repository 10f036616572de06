use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid candle history: {0}")]
    InvalidCandles(String),

    #[error("Stale market data for {pair}: newest candle is {age_secs}s old")]
    StaleData { pair: String, age_secs: i64 },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Invalid trade state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Failures worth retrying: the collaborator may recover on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Ledger(_) | Error::Http(_) | Error::Timeout(_) | Error::Io(_)
        )
    }
}
