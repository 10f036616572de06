pub mod config;
pub mod confluence;
pub mod indicators;
pub mod levels;
pub mod snapshot;
pub mod strategies;

pub use config::{
    MemoryConfigStore, StrategyConfig, StrategyConfigStore, StrategyFileConfig, TomlConfigStore,
};
pub use confluence::{ConfluenceAggregator, ConfluenceDecision};
pub use indicators::IndicatorSet;
pub use levels::{LevelConfig, LevelKind, SrLevel};
pub use snapshot::MarketSnapshot;
pub use strategies::{Reason, StrategyKind, StrategySignal};
