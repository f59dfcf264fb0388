use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::BotConfig;
use crate::error::BotError;
use crate::execution::executor::{ExecutionAction, Executor};
use crate::gateway::ExchangeGateway;
use crate::models::{Direction, Position};
use crate::risk::ExitReason;
use crate::strategy::trend::TrendStrategy;
use crate::strategy::Strategy;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub symbol: String,
    pub exit_reason: ExitReason,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenedPosition {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub price: f64,
}

/// What one reconciliation cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub closed: Vec<ClosedPosition>,
    pub opened: Vec<OpenedPosition>,
    pub skipped: Vec<(String, String)>,  // (symbol, reason)
    pub failures: Vec<(String, String)>, // (symbol, error)
}

impl CycleReport {
    fn skip(&mut self, symbol: &str, reason: impl Into<String>) {
        self.skipped.push((symbol.to_string(), reason.into()));
    }

    fn fail(&mut self, symbol: &str, err: &BotError) {
        tracing::error!("❌ {}: {}", symbol, err);
        self.failures.push((symbol.to_string(), err.to_string()));
    }
}

enum EntryOutcome {
    Opened(OpenedPosition),
    Skipped(String),
}

/// Runs the periodic reconciliation cycle against an exchange gateway
///
/// Each cycle manages exits for open positions, then looks for new entries
/// on the watchlist while staying under the position cap. Cycles run one at
/// a time on a single task; the trailing state lives here and nowhere else.
pub struct ReconciliationScheduler {
    gateway: Arc<dyn ExchangeGateway>,
    config: BotConfig,
    strategy: Box<dyn Strategy>,
    executor: Executor,
    running: Arc<AtomicBool>,
}

impl ReconciliationScheduler {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: BotConfig) -> Self {
        let strategy = Box::new(TrendStrategy::new(config.signal.clone()));
        let executor = Executor::new(
            config.risk_per_trade,
            config.leverage,
            config.protective.clone(),
            config.trailing,
        );

        Self {
            gateway,
            config,
            strategy,
            executor,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Flag shared with the health endpoint; true while cycling
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Warm up the gateway and verify there is enough capital to trade
    pub async fn startup_check(&self) -> Result<()> {
        self.gateway.load_markets().await?;

        let balances = self.gateway.fetch_balance().await?;
        tracing::info!("💰 Account balances:");
        for (currency, total) in balances.funded() {
            tracing::info!("  {}: {:.4}", currency, total);
        }

        let base = &self.config.base_currency;
        let total = balances.get(base).total;
        if total < self.config.min_capital {
            return Err(BotError::InsufficientCapital {
                currency: base.clone(),
                have: total,
                need: self.config.min_capital,
            });
        }

        tracing::info!("✅ Startup check passed: {:.2} {} available", total, base);
        Ok(())
    }

    /// Run one reconciliation cycle
    ///
    /// Only a failure to read the initial account snapshot is returned as an
    /// error; per-symbol failures are recorded in the report.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        // Step 1: account snapshot
        let balances = self.gateway.fetch_balance().await?;
        let positions = self.gateway.fetch_positions().await?;
        let free = balances.free(&self.config.base_currency);
        tracing::info!(
            "💰 Free balance: {:.2} {}",
            free,
            self.config.base_currency
        );

        // Step 2: exits
        let open: Vec<&Position> = positions.iter().filter(|p| p.is_open()).collect();
        for position in &open {
            self.manage_position(position, &mut report).await;
        }

        let open_symbols: HashSet<&str> = open.iter().map(|p| p.symbol.as_str()).collect();
        for symbol in self.executor.forget_closed(&open_symbols) {
            tracing::debug!("Dropped trailing state for closed position {}", symbol);
        }

        // Step 3: refresh open count after closes
        let positions = match self.gateway.fetch_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                report.fail("positions", &e);
                return Ok(report);
            }
        };
        let held: HashSet<&str> = positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| p.symbol.as_str())
            .collect();

        let max = self.config.max_concurrent_positions;
        if held.len() >= max {
            tracing::info!(
                "⏸️  {} open positions (max {}), no new entries",
                held.len(),
                max
            );
            return Ok(report);
        }

        // Step 4: entries
        let mut slots = max - held.len();
        let watchlist = self.config.watchlist.clone();
        for symbol in &watchlist {
            if held.contains(symbol.as_str()) {
                report.skip(symbol, "Already in position");
                continue;
            }
            if slots == 0 {
                report.skip(symbol, "Position limit reached");
                continue;
            }

            match self.try_open(symbol, free).await {
                Ok(EntryOutcome::Opened(opened)) => {
                    slots -= 1;
                    report.opened.push(opened);
                }
                Ok(EntryOutcome::Skipped(reason)) => {
                    tracing::debug!("{}: {}", symbol, reason);
                    report.skip(symbol, reason);
                }
                Err(e) if e.is_insufficient_data() => {
                    tracing::warn!("⚠️  {}", e);
                    report.skip(symbol, e.to_string());
                }
                Err(e) => report.fail(symbol, &e),
            }
        }

        Ok(report)
    }

    async fn manage_position(&mut self, position: &Position, report: &mut CycleReport) {
        let decision = self.executor.review_position(position);

        let (side, quantity, exit_reason) = match decision.action {
            ExecutionAction::Close {
                side,
                quantity,
                exit_reason,
            } => (side, quantity, exit_reason),
            _ => {
                tracing::debug!("{}: {}", position.symbol, decision.reason);
                return;
            }
        };

        tracing::info!("🔔 Closing {}: {}", position.symbol, decision.reason);
        match self
            .gateway
            .create_market_order(&position.symbol, side, quantity)
            .await
        {
            Ok(ack) => {
                // Trailing state is only dropped once the close is accepted
                self.executor.position_closed(&position.symbol);
                tracing::info!(
                    "✅ Closed {} ({:?}): {} contracts, order {}",
                    position.symbol,
                    exit_reason,
                    ack.quantity,
                    ack.order_id
                );
                report.closed.push(ClosedPosition {
                    symbol: position.symbol.clone(),
                    exit_reason,
                    quantity: ack.quantity,
                });
            }
            Err(e) => report.fail(&position.symbol, &e),
        }
    }

    async fn try_open(&self, symbol: &str, free_balance: f64) -> Result<EntryOutcome> {
        let candles = self
            .gateway
            .fetch_ohlcv(symbol, &self.config.timeframe, self.config.candle_limit)
            .await?;

        let signal = self.strategy.generate_signal(symbol, &candles)?;
        if signal.direction == Direction::Neutral {
            return Ok(EntryOutcome::Skipped("Neutral signal".to_string()));
        }

        let ticker = self.gateway.fetch_ticker(symbol).await?;
        let decision = self
            .executor
            .process_signal(&signal, free_balance, ticker.last)?;

        let (side, quantity) = match decision.action {
            ExecutionAction::Open { side, quantity } => (side, quantity),
            _ => return Ok(EntryOutcome::Skipped(decision.reason)),
        };

        self.gateway
            .set_leverage(self.config.leverage, symbol)
            .await?;
        let ack = self
            .gateway
            .create_market_order(symbol, side, quantity)
            .await?;

        tracing::info!(
            "🚀 Opened {:?} {}: {} @ {:.4} ({})",
            signal.direction,
            symbol,
            ack.quantity,
            ticker.last,
            decision.reason
        );

        Ok(EntryOutcome::Opened(OpenedPosition {
            symbol: symbol.to_string(),
            direction: signal.direction,
            quantity: ack.quantity,
            price: ticker.last,
        }))
    }

    async fn run_logged_cycle(&mut self) {
        tracing::info!("🔄 Starting reconciliation cycle");
        match self.run_cycle().await {
            Ok(report) => tracing::info!(
                "📊 Cycle complete: {} closed, {} opened, {} skipped, {} failed",
                report.closed.len(),
                report.opened.len(),
                report.skipped.len(),
                report.failures.len()
            ),
            Err(e) => tracing::error!("❌ Cycle aborted: {}", e),
        }
    }

    /// Retry the startup check every interval until it passes
    ///
    /// Returns false if shutdown was requested first.
    async fn wait_until_ready(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            match self.startup_check().await {
                Ok(()) => return true,
                Err(e) => tracing::error!(
                    "❌ Startup check failed: {}. Retrying in {} min",
                    e,
                    self.config.cycle_interval_minutes
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_interval()) => {}
                _ = shutdown.changed() => return false,
            }
        }
    }

    /// Startup check, then a single cycle
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        self.startup_check().await?;
        self.running.store(true, Ordering::SeqCst);
        let report = self.run_cycle().await;
        self.running.store(false, Ordering::SeqCst);
        report
    }

    /// Cycle on the configured interval until shutdown is signalled
    ///
    /// The first cycle starts immediately. A cycle in progress when shutdown
    /// arrives runs to completion.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.wait_until_ready(&mut shutdown).await {
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "⏰ Cycling every {} min over {} symbols",
            self.config.cycle_interval_minutes,
            self.config.watchlist.len()
        );

        let mut ticker = interval_at(Instant::now(), self.config.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_logged_cycle().await,
                _ = shutdown.changed() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("🛑 Scheduler stopped");
    }
}
