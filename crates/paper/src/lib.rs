use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Config, Error, Explanation, OrderSide, PaperTradeLedger, PostAnalysis, Result, Trade,
    TradeRequest, TradeStatus,
};

/// Sizing and exposure limits for the simulated account.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperConfig {
    pub initial_balance: f64,
    /// Share of the current balance committed per trade, in percent.
    pub position_size_pct: f64,
    pub max_open_trades: usize,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            position_size_pct: 5.0,
            max_open_trades: 3,
        }
    }
}

impl From<&Config> for PaperConfig {
    fn from(config: &Config) -> Self {
        Self {
            initial_balance: config.initial_balance,
            position_size_pct: config.position_size_pct,
            max_open_trades: config.max_open_trades,
        }
    }
}

/// Running account totals, updated on every close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub balance: f64,
    pub initial_balance: f64,
    pub total_pnl: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub best_trade_pnl: f64,
    pub worst_trade_pnl: f64,
}

impl Portfolio {
    fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            total_pnl: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            best_trade_pnl: 0.0,
            worst_trade_pnl: 0.0,
        }
    }

    /// Percentage of closed trades that made money.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }

    fn record(&mut self, pnl: f64) {
        self.balance += pnl;
        self.total_pnl += pnl;
        self.total_trades += 1;
        if pnl > 0.0 {
            self.winning_trades += 1;
            self.best_trade_pnl = self.best_trade_pnl.max(pnl);
        } else {
            self.losing_trades += 1;
            self.worst_trade_pnl = self.worst_trade_pnl.min(pnl);
        }
    }
}

/// Closed-trade results grouped by the strategy label a trade was opened with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_pnl: f64,
    pub win_rate: f64,
}

struct Record {
    trade: Trade,
    explanation: Explanation,
    post_analysis: Option<PostAnalysis>,
}

struct Book {
    records: HashMap<String, Record>,
    /// Trade ids in opening order.
    order: Vec<String>,
    portfolio: Portfolio,
}

impl Book {
    fn open_count(&self) -> usize {
        self.records.values().filter(|r| r.trade.is_open()).count()
    }

    fn close(&mut self, trade_id: &str, exit_price: f64) -> Result<Trade> {
        let record = self
            .records
            .get_mut(trade_id)
            .ok_or_else(|| Error::TradeNotFound(trade_id.to_string()))?;
        if !record.trade.is_open() {
            return Err(Error::InvalidState(format!("trade {trade_id} is already closed")));
        }
        let trade = &mut record.trade;
        let (pnl, pnl_percent) = trade.pnl_at(exit_price);
        trade.exit_price = Some(exit_price);
        trade.pnl = Some(pnl);
        trade.pnl_percent = Some(pnl_percent);
        trade.status = TradeStatus::Closed;
        trade.closed_at = Some(Utc::now());
        let closed = trade.clone();
        self.portfolio.record(pnl);

        info!(
            trade_id = %closed.id,
            pair = %closed.pair,
            side = %closed.side,
            exit = exit_price,
            pnl = pnl,
            pnl_percent = pnl_percent,
            "Paper trade closed"
        );
        Ok(closed)
    }
}

/// In-memory paper account. Trades, their explanations and retrospectives
/// are kept together; nothing is persisted.
#[derive(Clone)]
pub struct PaperLedger {
    config: PaperConfig,
    book: Arc<RwLock<Book>>,
}

impl PaperLedger {
    pub fn new(config: PaperConfig) -> Self {
        info!(
            balance = config.initial_balance,
            position_size_pct = config.position_size_pct,
            max_open_trades = config.max_open_trades,
            "PaperLedger initialized"
        );
        Self {
            config,
            book: Arc::new(RwLock::new(Book {
                records: HashMap::new(),
                order: Vec::new(),
                portfolio: Portfolio::new(config.initial_balance),
            })),
        }
    }

    pub async fn portfolio(&self) -> Portfolio {
        self.book.read().await.portfolio.clone()
    }

    /// All trades, oldest first.
    pub async fn trades(&self) -> Vec<Trade> {
        let book = self.book.read().await;
        book.order
            .iter()
            .filter_map(|id| book.records.get(id).map(|r| r.trade.clone()))
            .collect()
    }

    /// Per-strategy results over closed trades, ordered by strategy label.
    pub async fn performance(&self) -> Vec<StrategyPerformance> {
        let book = self.book.read().await;
        let mut by_strategy: BTreeMap<&str, StrategyPerformance> = BTreeMap::new();
        for record in book.records.values() {
            let trade = &record.trade;
            let Some(pnl) = trade.pnl.filter(|_| !trade.is_open()) else {
                continue;
            };
            let entry = by_strategy
                .entry(trade.strategy.as_str())
                .or_insert_with(|| StrategyPerformance {
                    strategy: trade.strategy.clone(),
                    trades: 0,
                    wins: 0,
                    losses: 0,
                    total_pnl: 0.0,
                    win_rate: 0.0,
                });
            entry.trades += 1;
            entry.total_pnl += pnl;
            if pnl > 0.0 {
                entry.wins += 1;
            } else {
                entry.losses += 1;
            }
        }
        by_strategy
            .into_values()
            .map(|mut p| {
                p.win_rate = p.wins as f64 / p.trades as f64 * 100.0;
                p
            })
            .collect()
    }
}

/// Price at which a stop or target touched by `price` fills. Stops are
/// checked first.
fn triggered_exit(trade: &Trade, price: f64) -> Option<f64> {
    let long = trade.side == OrderSide::Buy;
    let crossed_down = |level: &f64| price <= *level;
    let crossed_up = |level: &f64| price >= *level;
    let stop = if long {
        trade.stop_loss.filter(crossed_down)
    } else {
        trade.stop_loss.filter(crossed_up)
    };
    stop.or(if long {
        trade.take_profit.filter(crossed_up)
    } else {
        trade.take_profit.filter(crossed_down)
    })
}

#[async_trait]
impl PaperTradeLedger for PaperLedger {
    async fn open_trade(
        &self,
        request: TradeRequest,
        explanation: Explanation,
    ) -> Result<Option<Trade>> {
        if !(request.entry_price.is_finite() && request.entry_price > 0.0) {
            return Err(Error::InvalidState(format!(
                "invalid entry price {} for {}",
                request.entry_price, request.pair
            )));
        }
        let mut book = self.book.write().await;

        let open = book.open_count();
        if open >= self.config.max_open_trades {
            debug!(pair = %request.pair, open, "Open trade cap reached, declining");
            return Ok(None);
        }
        if book
            .records
            .values()
            .any(|r| r.trade.is_open() && r.trade.pair == request.pair)
        {
            debug!(pair = %request.pair, "Pair already has an open trade, declining");
            return Ok(None);
        }

        let amount = book.portfolio.balance * self.config.position_size_pct / 100.0;
        let trade = Trade {
            id: uuid::Uuid::new_v4().to_string(),
            pair: request.pair,
            side: request.side,
            entry_price: request.entry_price,
            exit_price: None,
            quantity: amount / request.entry_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            status: TradeStatus::Open,
            pnl: None,
            pnl_percent: None,
            strategy: request.strategy,
            timeframe: request.timeframe,
            confluence_score: request.confluence_score,
            created_at: Utc::now(),
            closed_at: None,
        };

        info!(
            trade_id = %trade.id,
            pair = %trade.pair,
            side = %trade.side,
            entry = trade.entry_price,
            quantity = trade.quantity,
            confluence = trade.confluence_score,
            "Paper trade opened"
        );

        book.order.push(trade.id.clone());
        book.records.insert(
            trade.id.clone(),
            Record {
                trade: trade.clone(),
                explanation,
                post_analysis: None,
            },
        );
        Ok(Some(trade))
    }

    async fn check_open_trades(&self, pair: &str, price: f64) -> Result<Vec<Trade>> {
        let mut book = self.book.write().await;
        let due: Vec<(String, f64)> = book
            .order
            .iter()
            .filter_map(|id| book.records.get(id))
            .filter(|r| r.trade.is_open() && r.trade.pair == pair)
            .filter_map(|r| Some((r.trade.id.clone(), triggered_exit(&r.trade, price)?)))
            .collect();

        let mut closed = Vec::with_capacity(due.len());
        for (id, exit) in due {
            closed.push(book.close(&id, exit)?);
        }
        Ok(closed)
    }

    async fn close_trade(&self, trade_id: &str, price: f64) -> Result<Trade> {
        self.book.write().await.close(trade_id, price)
    }

    async fn attach_post_analysis(&self, trade_id: &str, analysis: PostAnalysis) -> Result<()> {
        let mut book = self.book.write().await;
        let record = book
            .records
            .get_mut(trade_id)
            .ok_or_else(|| Error::TradeNotFound(trade_id.to_string()))?;
        if record.trade.is_open() {
            return Err(Error::InvalidState(format!(
                "trade {trade_id} is still open, post-analysis not allowed"
            )));
        }
        if record.post_analysis.is_some() {
            return Err(Error::InvalidState(format!(
                "trade {trade_id} already has a post-analysis"
            )));
        }
        record.post_analysis = Some(analysis);
        debug!(trade_id, "Post-analysis attached");
        Ok(())
    }

    async fn trade(&self, trade_id: &str) -> Result<Option<Trade>> {
        Ok(self
            .book
            .read()
            .await
            .records
            .get(trade_id)
            .map(|r| r.trade.clone()))
    }

    async fn explanation(&self, trade_id: &str) -> Result<Option<Explanation>> {
        Ok(self
            .book
            .read()
            .await
            .records
            .get(trade_id)
            .map(|r| r.explanation.clone()))
    }

    async fn post_analysis(&self, trade_id: &str) -> Result<Option<PostAnalysis>> {
        Ok(self
            .book
            .read()
            .await
            .records
            .get(trade_id)
            .and_then(|r| r.post_analysis.clone()))
    }

    async fn open_trades(&self) -> Result<Vec<Trade>> {
        let book = self.book.read().await;
        Ok(book
            .order
            .iter()
            .filter_map(|id| book.records.get(id))
            .filter(|r| r.trade.is_open())
            .map(|r| r.trade.clone())
            .collect())
    }
}
