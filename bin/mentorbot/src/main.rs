use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use common::{CandleProvider, Config, DataSource, EngineCommand, Notification};
use engine::{BinanceKlines, Cycle, CycleSettings, Engine, MockCandles, Notifier, RetryPolicy};
use explain::Glossary;
use paper::{PaperConfig, PaperLedger};
use strategy::TomlConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment configuration")?;
    info!(
        pairs = ?cfg.pairs,
        timeframe = %cfg.timeframe,
        source = ?cfg.data_source,
        strategy_config = %cfg.strategy_config_path,
        "MentorBot starting"
    );

    // ── Market data (injected based on DATA_SOURCE) ───────────────────────────
    let provider: Arc<dyn CandleProvider> = match cfg.data_source {
        DataSource::Binance => {
            info!(base_url = %cfg.binance_base_url, "Using Binance public klines");
            Arc::new(BinanceKlines::new(cfg.binance_base_url.clone())?)
        }
        DataSource::Mock => {
            info!(seed = cfg.mock_seed, "Using seeded mock candles");
            Arc::new(MockCandles::new(cfg.mock_seed))
        }
    };

    // ── Glossary ──────────────────────────────────────────────────────────────
    let glossary = match &cfg.glossary_path {
        Some(path) => Glossary::load(path).context("failed to load glossary overrides")?,
        None => Glossary::builtin(),
    };

    // ── Ledger ────────────────────────────────────────────────────────────────
    let ledger = PaperLedger::new(PaperConfig::from(&cfg));

    // ── Engine ────────────────────────────────────────────────────────────────
    let notifier = Notifier::new(cfg.notification_capacity);
    let cycle = Cycle::new(
        CycleSettings::from(&cfg),
        provider,
        Arc::new(ledger.clone()),
        Arc::new(TomlConfigStore::new(&cfg.strategy_config_path)),
        Arc::new(glossary),
        notifier,
        RetryPolicy::from(&cfg),
    );
    let (engine, handle) = Engine::new(cycle, cfg.scan_interval);

    // ── Notification consumer ─────────────────────────────────────────────────
    let mut notifications = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(Notification::NewTrade(trade)) => info!(
                    event = "new_trade",
                    trade_id = %trade.id,
                    pair = %trade.pair,
                    side = %trade.side,
                    entry = trade.entry_price,
                    strategy = %trade.strategy,
                    "Notification"
                ),
                Ok(Notification::PriceUpdate { pair, price, .. }) => {
                    debug!(event = "price_update", pair = %pair, price, "Notification")
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Notification consumer lagged, oldest events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── Spawn and start ───────────────────────────────────────────────────────
    tokio::spawn(engine.run());
    handle.send(EngineCommand::Start).await;

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    handle.send(EngineCommand::Stop).await;

    let portfolio = ledger.portfolio().await;
    info!(
        balance = portfolio.balance,
        total_pnl = portfolio.total_pnl,
        trades = portfolio.total_trades,
        win_rate = portfolio.win_rate(),
        "Shutdown signal received. Final paper portfolio"
    );
    for perf in ledger.performance().await {
        info!(
            strategy = %perf.strategy,
            trades = perf.trades,
            wins = perf.wins,
            losses = perf.losses,
            total_pnl = perf.total_pnl,
            win_rate = perf.win_rate,
            "Strategy performance"
        );
    }
    Ok(())
}
