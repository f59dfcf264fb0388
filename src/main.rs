use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use futuresbot::config::BotConfig;
use futuresbot::execution::ReconciliationScheduler;
use futuresbot::gateway::{BinanceFuturesClient, ExchangeGateway, PaperGateway, SyntheticFeed};
use futuresbot::health::{self, HealthState};

#[derive(Parser, Debug)]
#[command(name = "futuresbot", about = "Trend-following futures trading bot")]
struct Cli {
    /// Trade against an in-memory exchange fed by synthetic candles
    #[arg(long)]
    paper: bool,

    /// Run the startup check and a single cycle, then exit
    #[arg(long)]
    once: bool,

    /// Path to a TOML config file (default: futuresbot.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the synthetic paper feed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut config =
        BotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.paper {
        config.paper = true;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!("🚀 Futures bot starting");
    log_configuration(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let gateway: Arc<dyn ExchangeGateway> = if config.paper {
        let paper = Arc::new(
            PaperGateway::new(config.base_currency.clone(), config.paper_starting_balance)
                .with_history_limit(config.candle_limit * 2),
        );
        spawn_paper_feed(paper.clone(), &config, cli.seed, shutdown_rx.clone());
        paper
    } else {
        Arc::new(
            BinanceFuturesClient::new(config.binance_settings())
                .context("Failed to create Binance client")?,
        )
    };

    let mut scheduler = ReconciliationScheduler::new(gateway, config.clone());

    if cli.once {
        let report = scheduler.run_once().await.context("Cycle failed")?;
        tracing::info!(
            "📊 Done: {} closed, {} opened, {} skipped, {} failed",
            report.closed.len(),
            report.opened.len(),
            report.skipped.len(),
            report.failures.len()
        );
        let _ = shutdown_tx.send(true);
        return Ok(());
    }

    let health_state = HealthState {
        running: scheduler.running_flag(),
        leverage: config.leverage,
        base_currency: config.base_currency.clone(),
    };
    let health_task = tokio::spawn(health::serve(
        config.health_port,
        health_state,
        shutdown_rx.clone(),
    ));

    let scheduler_task = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    tracing::info!("\nPress Ctrl+C to stop...\n");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");

    let _ = shutdown_tx.send(true);
    scheduler_task.await.context("Scheduler task panicked")?;
    match health_task.await {
        Ok(Err(e)) => tracing::error!("Health server error: {}", e),
        Err(e) => tracing::error!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    tracing::info!("👋 Futures bot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("futuresbot=info")),
        )
        .init();
}

fn log_configuration(config: &BotConfig) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Mode: {}", if config.paper { "PAPER" } else { "LIVE" });
    tracing::info!("  Leverage: {}x", config.leverage);
    tracing::info!("  Risk per trade: {}%", config.risk_per_trade * 100.0);
    tracing::info!("  Interval: {} min", config.cycle_interval_minutes);
    tracing::info!("  Max positions: {}", config.max_concurrent_positions);
    tracing::info!(
        "  Trailing: arm at +{}%, close on {}% pullback",
        config.trailing.activation_pct * 100.0,
        config.trailing.retracement_pct * 100.0
    );
    tracing::info!("  Watchlist ({}):", config.base_currency);
    for symbol in &config.watchlist {
        tracing::info!("    - {}", symbol);
    }
}

/// Minutes per candle for a Binance interval string such as `15m` or `4h`
fn timeframe_minutes(timeframe: &str) -> i64 {
    let split = timeframe.char_indices().last().map_or(0, |(i, _)| i);
    let (value, unit) = timeframe.split_at(split);
    let value: i64 = value.parse().unwrap_or(15);
    match unit {
        "m" => value,
        "h" => value * 60,
        "d" => value * 60 * 24,
        "w" => value * 60 * 24 * 7,
        _ => 15,
    }
}

fn starting_price(symbol: &str) -> f64 {
    match symbol {
        s if s.starts_with("BTC") => 60_000.0,
        s if s.starts_with("ETH") => 3_000.0,
        s if s.starts_with("SOL") => 150.0,
        _ => 100.0,
    }
}

/// Seed the paper exchange with history, then add one candle per cycle
fn spawn_paper_feed(
    paper: Arc<PaperGateway>,
    config: &BotConfig,
    seed: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut feed = SyntheticFeed::new(seed, timeframe_minutes(&config.timeframe));
    for symbol in &config.watchlist {
        let history = feed.seed_symbol(symbol, starting_price(symbol), config.candle_limit);
        paper.set_candles(symbol, history);
    }
    tracing::info!(
        "📝 Paper mode: {} synthetic series, {:.2} {} starting balance",
        config.watchlist.len(),
        config.paper_starting_balance,
        config.base_currency
    );

    let period = Duration::from_secs(config.cycle_interval_minutes * 60);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The seeded history already covers the first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for symbol in feed.symbols() {
                        if let Some(candle) = feed.next_candle(&symbol) {
                            paper.push_candle(&symbol, candle);
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}
