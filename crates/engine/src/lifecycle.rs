use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use common::{EngineCommand, EngineState, Notification};

use crate::cycle::Cycle;
use crate::notify::Notifier;

/// Cloneable handle given to whatever drives the engine from outside.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    notifier: Notifier,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!("Engine is gone, command dropped");
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to trade and price notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }
}

/// Owns the evaluation cycle and runs it on a fixed interval while
/// `Running`. Commands and ticks are handled on the same task, so a manual
/// close never interleaves with a cycle.
pub struct Engine {
    cycle: Cycle,
    scan_interval: Duration,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(cycle: Cycle, scan_interval: Duration) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            notifier: cycle.notifier().clone(),
        };

        let engine = Engine {
            cycle,
            scan_interval,
            state,
            command_rx,
        };

        (engine, handle)
    }

    /// Run until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(interval = ?self.scan_interval, "Engine initialized in Stopped state. Waiting for Start command.");

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if *self.state.read().await == EngineState::Running {
                        self.tick().await;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, cmd: EngineCommand) {
        let current = *self.state.read().await;
        match cmd {
            EngineCommand::Start => match current {
                EngineState::Running => info!("Engine already running"),
                EngineState::Halted => warn!("Engine is halted, send ClearHalt first"),
                _ => {
                    info!("Engine starting");
                    self.set_state(EngineState::Running).await;
                    self.tick().await;
                }
            },

            EngineCommand::Stop => match current {
                EngineState::Halted => warn!("Engine is halted, send ClearHalt first"),
                _ => {
                    info!("Engine stopping");
                    self.set_state(EngineState::Stopped).await;
                }
            },

            EngineCommand::Pause => {
                if current == EngineState::Running {
                    info!("Engine paused, no cycles until resumed");
                    self.set_state(EngineState::Paused).await;
                }
            }

            EngineCommand::Resume => {
                if current == EngineState::Paused {
                    info!("Engine resumed");
                    self.set_state(EngineState::Running).await;
                }
            }

            EngineCommand::ClearHalt => {
                if current == EngineState::Halted {
                    info!(pending = self.cycle.pending_writes(), "Halt cleared, engine resuming");
                    self.set_state(EngineState::Running).await;
                    self.tick().await;
                } else {
                    warn!("ClearHalt received but engine is not halted");
                }
            }

            EngineCommand::CloseTrade(id) => match self.cycle.close_trade(&id, Utc::now()).await {
                Ok(trade) => info!(trade_id = %id, pnl = ?trade.pnl, "Manual close done"),
                Err(e) => warn!(trade_id = %id, error = %e, "Manual close failed"),
            },
        }
    }

    async fn tick(&mut self) {
        match self.cycle.run(Utc::now()).await {
            Ok(report) => info!(
                evaluated = report.evaluated.len(),
                skipped = report.skipped.len(),
                opened = report.opened.len(),
                closed = report.closed.len(),
                "Cycle complete"
            ),
            Err(e) => {
                error!(
                    error = %e,
                    pending = self.cycle.pending_writes(),
                    "ALERT: ledger unavailable, engine halted until ClearHalt"
                );
                self.set_state(EngineState::Halted).await;
            }
        }
    }

    async fn set_state(&self, state: EngineState) {
        *self.state.write().await = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleSettings;
    use crate::retry::RetryPolicy;
    use crate::testutil::{trend_only, FlakyLedger, LiveCandles};
    use common::PaperTradeLedger;
    use explain::Glossary;
    use paper::{PaperConfig, PaperLedger};
    use strategy::MemoryConfigStore;

    fn engine(ledger: Arc<dyn PaperTradeLedger>) -> (Engine, EngineHandle) {
        let settings = CycleSettings {
            pairs: vec!["BTCUSDT".into()],
            timeframe: "15m".into(),
            candle_limit: 250,
            fetch_timeout: Duration::from_secs(1),
            stale_tolerance: Duration::from_secs(1800),
            trade_cooldown: Duration::from_secs(300),
        };
        let cycle = Cycle::new(
            settings,
            Arc::new(LiveCandles),
            ledger,
            Arc::new(MemoryConfigStore::new(trend_only())),
            Arc::new(Glossary::builtin()),
            Notifier::new(16),
            RetryPolicy {
                attempts: 2,
                base: Duration::from_millis(1),
            },
        );
        Engine::new(cycle, Duration::from_secs(3600))
    }

    async fn wait_for(handle: &EngineHandle, want: EngineState) {
        for _ in 0..200 {
            if handle.state().await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never reached {want}, stuck in {}", handle.state().await);
    }

    #[tokio::test]
    async fn start_runs_a_cycle_and_commands_move_state() {
        let ledger = Arc::new(PaperLedger::new(PaperConfig::default()));
        let (engine, handle) = engine(ledger.clone());
        let mut rx = handle.subscribe();
        tokio::spawn(engine.run());

        assert_eq!(handle.state().await, EngineState::Stopped);
        handle.send(EngineCommand::Start).await;
        wait_for(&handle, EngineState::Running).await;

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_name(), "price_update");
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let trade = match second {
            Notification::NewTrade(trade) => trade,
            other => panic!("expected a new trade, got {other:?}"),
        };

        handle.send(EngineCommand::Pause).await;
        wait_for(&handle, EngineState::Paused).await;
        handle.send(EngineCommand::Resume).await;
        wait_for(&handle, EngineState::Running).await;

        handle.send(EngineCommand::CloseTrade(trade.id.clone())).await;
        for _ in 0..200 {
            if ledger.post_analysis(&trade.id).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ledger.post_analysis(&trade.id).await.unwrap().is_some());

        handle.send(EngineCommand::Stop).await;
        wait_for(&handle, EngineState::Stopped).await;
    }

    #[tokio::test]
    async fn ledger_outage_halts_until_cleared() {
        let ledger = Arc::new(FlakyLedger::new(PaperLedger::new(PaperConfig::default()), 2));
        let (engine, handle) = engine(ledger.clone());
        tokio::spawn(engine.run());

        handle.send(EngineCommand::Start).await;
        wait_for(&handle, EngineState::Halted).await;
        assert!(ledger.open_trades().await.unwrap().is_empty());

        // Neither Start nor Stop then Start bypasses the halt.
        handle.send(EngineCommand::Start).await;
        handle.send(EngineCommand::Pause).await;
        handle.send(EngineCommand::Stop).await;
        handle.send(EngineCommand::Start).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().await, EngineState::Halted);

        handle.send(EngineCommand::ClearHalt).await;
        wait_for(&handle, EngineState::Running).await;
        for _ in 0..200 {
            if !ledger.open_trades().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ledger.open_trades().await.unwrap().len(), 1);
    }
}
