use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use trendbot::config::AppConfig;
use trendbot::execution::{ExecutionCoordinator, PairSpec, Scheduler};
use trendbot::risk::RiskOverlay;
use trendbot::strategy::SignalEngine;
use trendbot::venue::build_venues;
use trendbot::Result;

/// Moving-average crossover trading loop across multiple venues
#[derive(Debug, Parser)]
#[command(name = "trendbot", version)]
struct Cli {
    /// Path to the TOML configuration (default: ./trendbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quote live prices but simulate fills locally
    #[arg(long)]
    dry_run: bool,

    /// Run a single round and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.dry_run {
        cfg.trading.dry_run = true;
    }

    setup_logging(&cfg.log_filter);
    tracing::info!("🚀 trendbot starting");

    cfg.validate().context("Invalid configuration")?;
    let risk = RiskOverlay::new(cfg.trading.stop_loss_pct, cfg.trading.take_profit_pct)?;

    let venues = build_venues(&cfg)?;
    let mut pairs = Vec::with_capacity(cfg.pairs.len());
    for pair in &cfg.pairs {
        let adapter = venues
            .get(&pair.venue)
            .cloned()
            .with_context(|| format!("No adapter for venue {}", pair.venue))?;

        let engine =
            SignalEngine::new(cfg.trading.window)?.with_dedup(cfg.trading.dedupe_signals);

        pairs.push(PairSpec {
            adapter,
            symbol: pair.symbol.clone(),
            quantity: cfg.pair_quantity(pair),
            engine,
        });
    }

    log_configuration(&cfg);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let coordinator = ExecutionCoordinator::new(pairs, risk, shutdown_rx.clone());

    if cli.once {
        for report in coordinator.run_round().await {
            tracing::info!(
                venue = %report.venue,
                symbol = %report.symbol,
                outcome = ?report.outcome,
                "Round finished"
            );
        }
        return Ok(());
    }

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("⚠️  Shutdown signal received, finishing in-flight pairs...");
        let _ = shutdown_tx.send(true);
    });

    let mut scheduler = Scheduler::new(cfg.trading.tick_interval(), cfg.trading.shutdown_grace());
    scheduler.run(&coordinator, shutdown_rx).await;

    tracing::info!(rounds = scheduler.rounds(), "👋 trendbot stopped");
    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(cfg: &AppConfig) {
    tracing::info!("📊 Configuration:");
    tracing::info!("  Window: {} (signal after {} samples)", cfg.trading.window, cfg.trading.window * 2);
    tracing::info!(
        "  Brackets: stop x{} / target x{}",
        cfg.trading.stop_loss_pct,
        cfg.trading.take_profit_pct
    );
    tracing::info!("  Tick interval: {}s", cfg.trading.tick_interval_seconds);
    tracing::info!("  De-duplicate signals: {}", cfg.trading.dedupe_signals);
    tracing::info!("  Dry run: {}", cfg.trading.dry_run);
    tracing::info!("  Pairs: {}", cfg.pairs.len());
    for pair in &cfg.pairs {
        tracing::info!("    - {} on {} (qty {})", pair.symbol, pair.venue, cfg.pair_quantity(pair));
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM ({}), Ctrl+C only", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
