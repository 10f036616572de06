pub mod config;
pub mod error;
pub mod ledger;
pub mod provider;
pub mod types;

pub use config::{Config, DataSource};
pub use error::{Error, Result};
pub use ledger::PaperTradeLedger;
pub use provider::CandleProvider;
pub use types::*;
