use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use common::{Error, Result};

use crate::levels::LevelConfig;
use crate::strategies::StrategyKind;

/// Top-level strategy config file (TOML). Re-read at the start of every
/// cycle, so edits take effect without a restart.
///
/// Example `config/strategies.toml`:
/// ```toml
/// minimum_confluence = 3
///
/// [levels]
/// lookback = 100
/// tolerance_pct = 0.001
///
/// [strategy.technical]
/// enabled = true
///
/// [strategy.technical.params]
/// rsi_oversold = 30.0
/// rsi_overbought = 70.0
/// adx_threshold = 25.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    /// Votes the winning direction needs before a trade is opened.
    #[serde(default = "default_minimum_confluence")]
    pub minimum_confluence: u32,
    #[serde(default)]
    pub levels: LevelConfig,
    /// Per-strategy settings. A strategy with no entry runs with defaults.
    #[serde(rename = "strategy", default)]
    pub strategies: BTreeMap<StrategyKind, StrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Strategy-specific thresholds.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

fn default_minimum_confluence() -> u32 {
    3
}

fn default_enabled() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            params: HashMap::new(),
        }
    }
}

impl Default for StrategyFileConfig {
    fn default() -> Self {
        Self {
            minimum_confluence: default_minimum_confluence(),
            levels: LevelConfig::default(),
            strategies: BTreeMap::new(),
        }
    }
}

impl StrategyFileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: StrategyFileConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid strategy config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File-wide settings. Per-strategy parameters are checked by each
    /// evaluator so one bad strategy does not take the others down.
    pub fn validate(&self) -> Result<()> {
        if self.minimum_confluence == 0 {
            return Err(Error::Config("minimum_confluence must be at least 1".into()));
        }
        if self.levels.lookback == 0 || self.levels.swing_radius == 0 {
            return Err(Error::Config(
                "levels.lookback and levels.swing_radius must be positive".into(),
            ));
        }
        if !(self.levels.tolerance_pct > 0.0 && self.levels.tolerance_pct < 1.0) {
            return Err(Error::Config(format!(
                "levels.tolerance_pct must be in (0, 1), got {}",
                self.levels.tolerance_pct
            )));
        }
        Ok(())
    }

    /// Settings for one strategy, falling back to defaults when absent.
    pub fn strategy(&self, kind: StrategyKind) -> StrategyConfig {
        self.strategies.get(&kind).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, kind: StrategyKind) -> bool {
        self.strategies.get(&kind).map_or(true, |s| s.enabled)
    }

    /// Builder used by callers that assemble a config in code.
    pub fn with_strategy(mut self, kind: StrategyKind, cfg: StrategyConfig) -> Self {
        self.strategies.insert(kind, cfg);
        self
    }
}

// ─── Parameter access ─────────────────────────────────────────────────────────

/// Float parameter; integers are accepted. Missing → `default`,
/// wrong type → `Error::Config`.
pub fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(v)) => Ok(*v),
        Some(toml::Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(Error::Config(format!(
            "parameter '{key}' must be a number, got {}",
            other.type_str()
        ))),
    }
}

/// Non-negative integer parameter. Missing → `default`.
pub fn param_usize(
    params: &HashMap<String, toml::Value>,
    key: &str,
    default: usize,
) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(v)) if *v >= 0 => Ok(*v as usize),
        Some(other) => Err(Error::Config(format!(
            "parameter '{key}' must be a non-negative integer, got {other}"
        ))),
    }
}

// ─── Config stores ────────────────────────────────────────────────────────────

/// Source of the strategy configuration, read fresh every cycle.
#[async_trait]
pub trait StrategyConfigStore: Send + Sync {
    async fn load(&self) -> Result<StrategyFileConfig>;
}

/// Reads and validates a TOML file on every `load`.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StrategyConfigStore for TomlConfigStore {
    async fn load(&self) -> Result<StrategyFileConfig> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Config(format!(
                "failed to read strategy config at '{}': {e}",
                self.path.display()
            ))
        })?;
        StrategyFileConfig::from_toml_str(&content)
    }
}

/// In-memory store whose contents can be swapped at runtime.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: RwLock<StrategyFileConfig>,
}

impl MemoryConfigStore {
    pub fn new(cfg: StrategyFileConfig) -> Self {
        Self {
            inner: RwLock::new(cfg),
        }
    }

    pub async fn set(&self, cfg: StrategyFileConfig) {
        *self.inner.write().await = cfg;
    }
}

#[async_trait]
impl StrategyConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<StrategyFileConfig> {
        let cfg = self.inner.read().await.clone();
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
minimum_confluence = 2

[levels]
lookback = 80

[strategy.technical]
enabled = true

[strategy.technical.params]
rsi_oversold = 25
rsi_overbought = 75.5

[strategy.scalping]
enabled = false
"#;

    #[test]
    fn parses_sample_file() {
        let cfg = StrategyFileConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.minimum_confluence, 2);
        assert_eq!(cfg.levels.lookback, 80);
        assert_eq!(cfg.levels.swing_radius, 2);
        assert!(cfg.is_enabled(StrategyKind::Technical));
        assert!(!cfg.is_enabled(StrategyKind::Scalping));
        // absent entry → enabled with defaults
        assert!(cfg.is_enabled(StrategyKind::Trend));

        let params = cfg.strategy(StrategyKind::Technical).params;
        assert_eq!(param_f64(&params, "rsi_oversold", 30.0).unwrap(), 25.0);
        assert_eq!(param_f64(&params, "rsi_overbought", 70.0).unwrap(), 75.5);
        assert_eq!(param_f64(&params, "adx_threshold", 25.0).unwrap(), 25.0);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = StrategyFileConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, StrategyFileConfig::default());
        assert_eq!(cfg.minimum_confluence, 3);
    }

    #[test]
    fn zero_minimum_confluence_rejected() {
        let err = StrategyFileConfig::from_toml_str("minimum_confluence = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = StrategyFileConfig::from_toml_str("[strategy.arbitrage]\nenabled = true")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn wrong_param_type_is_config_error() {
        let mut params = HashMap::new();
        params.insert("rsi_oversold".to_string(), toml::Value::String("low".into()));
        params.insert("volume_window".to_string(), toml::Value::Integer(-3));
        assert!(matches!(
            param_f64(&params, "rsi_oversold", 30.0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            param_usize(&params, "volume_window", 20),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn toml_store_reports_missing_file() {
        let store = TomlConfigStore::new("/definitely/not/here/strategies.toml");
        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn toml_store_rereads_file() {
        let path = std::env::temp_dir().join(format!(
            "mentorbot-strategies-{}.toml",
            std::process::id()
        ));
        tokio::fs::write(&path, "minimum_confluence = 2").await.unwrap();
        let store = TomlConfigStore::new(&path);
        assert_eq!(store.load().await.unwrap().minimum_confluence, 2);

        tokio::fs::write(&path, "minimum_confluence = 4").await.unwrap();
        assert_eq!(store.load().await.unwrap().minimum_confluence, 4);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn memory_store_swaps_config() {
        let store = MemoryConfigStore::new(StrategyFileConfig::default());
        let disabled = StrategyFileConfig::default().with_strategy(
            StrategyKind::Trend,
            StrategyConfig {
                enabled: false,
                params: HashMap::new(),
            },
        );
        store.set(disabled).await;
        assert!(!store.load().await.unwrap().is_enabled(StrategyKind::Trend));
    }
}
