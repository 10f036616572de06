pub mod binance;
pub mod cycle;
pub mod lifecycle;
pub mod mock;
pub mod notify;
pub mod retry;

#[cfg(test)]
mod testutil;

pub use binance::BinanceKlines;
pub use cycle::{Cycle, CycleReport, CycleSettings};
pub use lifecycle::{Engine, EngineHandle};
pub use mock::MockCandles;
pub use notify::Notifier;
pub use retry::RetryPolicy;
