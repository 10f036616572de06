use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::{
    timeframe_minutes, AnalysisData, Candle, CandleProvider, Config, Error, Explanation,
    Notification, PaperTradeLedger, PostAnalysis, Result, Trade, TradeRequest,
};
use explain::{build_analysis, ConceptGlossary, ExplanationGenerator, PostTradeAnalyzer};
use strategy::{
    ConfluenceAggregator, ConfluenceDecision, MarketSnapshot, StrategyConfigStore,
    StrategyFileConfig,
};

use crate::notify::Notifier;
use crate::retry::RetryPolicy;

/// What one cycle looks at and how patient it is with its collaborators.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub pairs: Vec<String>,
    pub timeframe: String,
    pub candle_limit: usize,
    pub fetch_timeout: Duration,
    /// Maximum age of the newest closed candle before the pair is skipped.
    pub stale_tolerance: Duration,
    /// Minimum gap between two trades opened on the same pair.
    pub trade_cooldown: Duration,
}

impl From<&Config> for CycleSettings {
    fn from(config: &Config) -> Self {
        Self {
            pairs: config.pairs.clone(),
            timeframe: config.timeframe.clone(),
            candle_limit: config.candle_limit,
            fetch_timeout: config.fetch_timeout,
            stale_tolerance: config.stale_tolerance,
            trade_cooldown: config.trade_cooldown,
        }
    }
}

#[derive(Debug, Clone)]
enum LedgerWrite {
    Open {
        request: TradeRequest,
        explanation: Explanation,
    },
    PostAnalysis {
        trade_id: String,
        analysis: PostAnalysis,
    },
}

/// Work that exhausted its retries. Replayed, in order, at the start of the
/// next cycle.
#[derive(Debug, Clone)]
enum PendingWork {
    Write(LedgerWrite),
    /// A closed trade whose entry explanation could not be read.
    Review {
        trade: Trade,
        exit_indicators: BTreeMap<String, f64>,
    },
}

/// Outcome of one `Cycle::run`.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub evaluated: Vec<String>,
    pub skipped: Vec<String>,
    pub decisions: Vec<ConfluenceDecision>,
    pub opened: Vec<Trade>,
    pub closed: Vec<Trade>,
}

/// One pass over every configured pair: fetch, snapshot, settle open
/// trades, vote, explain, open. Pairs run one after another, so a pair is
/// never evaluated twice at once.
pub struct Cycle {
    settings: CycleSettings,
    provider: Arc<dyn CandleProvider>,
    ledger: Arc<dyn PaperTradeLedger>,
    store: Arc<dyn StrategyConfigStore>,
    glossary: Arc<dyn ConceptGlossary>,
    notifier: Notifier,
    retry: RetryPolicy,
    minimum_confluence: u32,
    last_trade_at: HashMap<String, DateTime<Utc>>,
    /// Last reading per pair, also the price used for manual closes.
    latest: HashMap<String, AnalysisData>,
    pending: VecDeque<PendingWork>,
}

impl Cycle {
    pub fn new(
        settings: CycleSettings,
        provider: Arc<dyn CandleProvider>,
        ledger: Arc<dyn PaperTradeLedger>,
        store: Arc<dyn StrategyConfigStore>,
        glossary: Arc<dyn ConceptGlossary>,
        notifier: Notifier,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            settings,
            provider,
            ledger,
            store,
            glossary,
            notifier,
            retry,
            minimum_confluence: StrategyFileConfig::default().minimum_confluence,
            last_trade_at: HashMap::new(),
            latest: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Live indicator reading from the last cycle that evaluated `pair`.
    pub fn analysis(&self, pair: &str) -> Option<&AnalysisData> {
        self.latest.get(pair)
    }

    /// Writes still waiting for the ledger to come back.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Run every pair once. `Err` only when the ledger stayed unavailable
    /// through all retries; the unwritten records are kept for replay.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        self.flush_pending(now, &mut report).await?;

        let config = match self.store.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Strategy configuration unusable, skipping cycle");
                return Ok(report);
            }
        };
        self.minimum_confluence = config.minimum_confluence;

        for pair in self.settings.pairs.clone() {
            if self.run_pair(&pair, &config, now, &mut report).await? {
                report.evaluated.push(pair);
            } else {
                report.skipped.push(pair);
            }
        }
        Ok(report)
    }

    /// Close a trade at the last price seen for its pair and review it.
    pub async fn close_trade(&mut self, trade_id: &str, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self
            .ledger
            .trade(trade_id)
            .await?
            .ok_or_else(|| Error::TradeNotFound(trade_id.to_string()))?;
        let (price, indicators) = self
            .latest
            .get(&trade.pair)
            .map(|view| (view.price, view.indicators.clone()))
            .ok_or_else(|| Error::InvalidState(format!("no price seen yet for {}", trade.pair)))?;

        let ledger = self.ledger.clone();
        let closed = self
            .retry
            .run("close_trade", || {
                let ledger = ledger.clone();
                let id = trade_id.to_string();
                async move { ledger.close_trade(&id, price).await }
            })
            .await?;
        info!(trade_id, price, "Trade closed manually");

        let mut report = CycleReport::default();
        self.review_closed(vec![closed.clone()], &indicators, now, &mut report)
            .await?;
        Ok(closed)
    }

    /// `Ok(false)` when the pair was skipped this cycle.
    async fn run_pair(
        &mut self,
        pair: &str,
        config: &StrategyFileConfig,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<bool> {
        let Some(candles) = self.fetch(pair).await else {
            return Ok(false);
        };
        if let Err(e) = check_fresh(
            pair,
            &candles,
            &self.settings.timeframe,
            self.settings.stale_tolerance,
            now,
        ) {
            warn!(pair, error = %e, "Stale market data, skipping pair");
            return Ok(false);
        }
        let snapshot =
            match MarketSnapshot::build(pair, &self.settings.timeframe, candles, &config.levels) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(pair, error = %e, "Unusable candle history, skipping pair");
                    return Ok(false);
                }
            };
        let Some(price) = snapshot.price() else {
            return Ok(false);
        };
        let analysis = build_analysis(&snapshot, self.glossary.as_ref());
        debug!(pair, overall = %analysis.overall, summary = %analysis.summary, "Market reading");
        let indicators = analysis.indicators.clone();
        self.latest.insert(pair.to_string(), analysis);
        self.notifier.publish(Notification::PriceUpdate {
            pair: pair.to_string(),
            price,
            timestamp: now,
        });

        let ledger = self.ledger.clone();
        let closed = match self
            .retry
            .run("check_open_trades", || {
                let ledger = ledger.clone();
                let pair = pair.to_string();
                async move { ledger.check_open_trades(&pair, price).await }
            })
            .await
        {
            Ok(closed) => closed,
            Err(e) => {
                warn!(pair, error = %e, "Could not check open trades, skipping pair");
                return Ok(false);
            }
        };
        self.review_closed(closed, &indicators, now, report).await?;

        let decision = ConfluenceAggregator::new(config).decide(&snapshot);
        report.decisions.push(decision.clone());
        let Some(request) = decision.trade_request() else {
            info!(
                pair,
                price,
                score = decision.score,
                participants = decision.participants,
                "No trade this cycle"
            );
            return Ok(true);
        };

        info!(
            pair,
            direction = %decision.direction,
            score = decision.score,
            participants = decision.participants,
            risk_reward = ?decision.risk_reward_ratio,
            strategy = %request.strategy,
            "Confluence decision"
        );

        if self.cooling_down(pair, now) {
            info!(pair, direction = %decision.direction, "Trade cooldown active, decision not traded");
            return Ok(true);
        }

        let explanation = ExplanationGenerator::new(self.glossary.as_ref()).generate(&decision);
        self.persist(LedgerWrite::Open { request, explanation }, now, report)
            .await?;
        Ok(true)
    }

    async fn fetch(&self, pair: &str) -> Option<Vec<Candle>> {
        let fetch = self.provider.fetch_candles(
            pair,
            &self.settings.timeframe,
            self.settings.candle_limit,
        );
        match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(candles)) => Some(candles),
            Ok(Err(e)) => {
                warn!(pair, error = %e, "Candle fetch failed, skipping pair");
                None
            }
            Err(_) => {
                warn!(pair, timeout = ?self.settings.fetch_timeout, "Candle fetch timed out, skipping pair");
                None
            }
        }
    }

    fn cooling_down(&self, pair: &str, now: DateTime<Utc>) -> bool {
        self.last_trade_at.get(pair).is_some_and(|opened| {
            (now - *opened)
                .to_std()
                .map_or(true, |elapsed| elapsed < self.settings.trade_cooldown)
        })
    }

    /// Build and store a retrospective for every freshly closed trade.
    async fn review_closed(
        &mut self,
        closed: Vec<Trade>,
        exit_indicators: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let mut failure = None;
        for trade in closed {
            if let Err(e) = self
                .review(trade.clone(), exit_indicators.clone(), now, report)
                .await
            {
                failure.get_or_insert(e);
            }
            report.closed.push(trade);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Review one closed trade against the explanation it was opened with.
    /// When that explanation cannot be read the review is queued, never
    /// written without it.
    async fn review(
        &mut self,
        trade: Trade,
        exit_indicators: BTreeMap<String, f64>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let ledger = self.ledger.clone();
        let explanation = match self
            .retry
            .run("explanation", || {
                let ledger = ledger.clone();
                let id = trade.id.clone();
                async move { ledger.explanation(&id).await }
            })
            .await
        {
            Ok(Some(explanation)) => explanation,
            Ok(None) => {
                error!(trade_id = %trade.id, "Closed trade has no stored explanation, reviewing without it");
                Explanation::default()
            }
            Err(e) if e.is_transient() => {
                error!(
                    trade_id = %trade.id,
                    error = %e,
                    "ALERT: explanation unavailable after retries, review kept for replay"
                );
                self.pending.push_back(PendingWork::Review {
                    trade,
                    exit_indicators,
                });
                return Err(e);
            }
            Err(e) => {
                error!(trade_id = %trade.id, error = %e, "Could not load explanation, trade not reviewed");
                return Ok(());
            }
        };

        let analyzer = PostTradeAnalyzer::new(self.minimum_confluence);
        match analyzer.analyze(&trade, &explanation, &exit_indicators) {
            Ok(analysis) => {
                info!(
                    trade_id = %trade.id,
                    pair = %trade.pair,
                    summary = %analysis.result_summary,
                    "Post-trade review"
                );
                let write = LedgerWrite::PostAnalysis {
                    trade_id: trade.id.clone(),
                    analysis,
                };
                self.persist(write, now, report).await
            }
            Err(e) => {
                warn!(trade_id = %trade.id, error = %e, "Post-trade review failed");
                Ok(())
            }
        }
    }

    async fn flush_pending(&mut self, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        info!(count = self.pending.len(), "Replaying queued ledger work");
        let mut queued = std::mem::take(&mut self.pending);
        while let Some(work) = queued.pop_front() {
            let result = match work {
                PendingWork::Write(write) => self.persist(write, now, report).await,
                PendingWork::Review {
                    trade,
                    exit_indicators,
                } => self.review(trade, exit_indicators, now, report).await,
            };
            if let Err(e) = result {
                self.pending.extend(queued);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Hand one write to the ledger with retries. A write that fails on a
    /// transient error is queued for replay and the failure returned.
    async fn persist(
        &mut self,
        write: LedgerWrite,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let ledger = self.ledger.clone();
        let result: Result<Option<Trade>> = match &write {
            LedgerWrite::Open {
                request,
                explanation,
            } => {
                self.retry
                    .run("open_trade", || {
                        let ledger = ledger.clone();
                        let request = request.clone();
                        let explanation = explanation.clone();
                        async move { ledger.open_trade(request, explanation).await }
                    })
                    .await
            }
            LedgerWrite::PostAnalysis { trade_id, analysis } => self
                .retry
                .run("attach_post_analysis", || {
                    let ledger = ledger.clone();
                    let trade_id = trade_id.clone();
                    let analysis = analysis.clone();
                    async move { ledger.attach_post_analysis(&trade_id, analysis).await }
                })
                .await
                .map(|()| None),
        };

        let failure = match (result, &write) {
            (Ok(Some(trade)), _) => {
                self.record_open(trade, now, report);
                None
            }
            (Ok(None), LedgerWrite::Open { request, .. }) => {
                info!(pair = %request.pair, side = %request.side, "Ledger declined the trade");
                None
            }
            (Ok(None), LedgerWrite::PostAnalysis { trade_id, .. }) => {
                debug!(trade_id = %trade_id, "Post-analysis stored");
                None
            }
            (Err(e), _) => Some(e),
        };
        let Some(e) = failure else {
            return Ok(());
        };

        if e.is_transient() {
            error!(
                error = %e,
                write = ?write,
                "ALERT: ledger unavailable after retries, write kept for replay"
            );
            self.pending.push_back(PendingWork::Write(write));
            Err(e)
        } else {
            error!(error = %e, write = ?write, "Ledger rejected write");
            Ok(())
        }
    }

    fn record_open(&mut self, trade: Trade, now: DateTime<Utc>, report: &mut CycleReport) {
        info!(
            trade_id = %trade.id,
            pair = %trade.pair,
            side = %trade.side,
            entry = trade.entry_price,
            stop_loss = ?trade.stop_loss,
            take_profit = ?trade.take_profit,
            "Trade opened"
        );
        self.last_trade_at.insert(trade.pair.clone(), now);
        self.notifier.publish(Notification::NewTrade(trade.clone()));
        report.opened.push(trade);
    }
}

/// Reject a history whose newest candle closed more than `tolerance` ago.
fn check_fresh(
    pair: &str,
    candles: &[Candle],
    timeframe: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(last) = candles.last() else {
        return Err(Error::InvalidCandles("history is empty".into()));
    };
    let minutes = timeframe_minutes(timeframe).unwrap_or(0);
    let closed_at = last.timestamp + chrono::Duration::minutes(minutes);
    let age = now - closed_at;
    match age.to_std() {
        Ok(elapsed) if elapsed > tolerance => Err(Error::StaleData {
            pair: pair.to_string(),
            age_secs: age.num_seconds(),
        }),
        _ => Ok(()),
    }
}
