// In app/src/main.rs

use anyhow::{Context as _, Result};
use app_config::{Settings, TraderConfig};
use clap::{Parser, Subcommand};
use core_types::TraderState;
use engine::{BuiltinEngineFactory, Engine, StateReconciler};
use events::{AuditSink, BroadcastSink, EngineEvent, FanoutSink, LogSink};
use execution::OrderExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::prelude::*;

mod paper;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Runs a fleet of virtual traders against one exchange account.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Registers every configured trader and runs the scheduler until Ctrl-C.
    Run {
        /// Extra roster file holding `[[traders]]` tables.
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },

    /// Loads and validates the configuration, then prints the trader roster.
    CheckConfig {
        #[arg(short, long)]
        roster: Option<PathBuf>,

        /// Print the resolved traders as JSON.
        #[arg(long)]
        json: bool,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let roster = match &cli.command {
        Commands::Run { roster } | Commands::CheckConfig { roster, .. } => roster.clone(),
    };
    let settings = load_settings(roster.as_ref())?;
    init_tracing(&settings.app.log_level);

    tracing::info!(environment = %settings.app.environment, traders = settings.traders.len(), "Starting fleet.");

    match cli.command {
        Commands::Run { .. } => run_app(settings).await?,
        Commands::CheckConfig { json, .. } => check_config(&settings, json)?,
    }

    tracing::info!("Fleet has finished successfully.");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let level = log_level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("audit", tracing::Level::INFO)
            .with_default(level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Settings from `config/`, plus the traders of an optional roster file.
fn load_settings(roster: Option<&PathBuf>) -> Result<Settings> {
    let mut settings = app_config::load_settings().context("failed to load settings from config/")?;
    if let Some(path) = roster {
        let extra = app_config::load_roster(path)
            .with_context(|| format!("failed to load roster {}", path.display()))?;
        settings.traders.extend(extra);
        app_config::validate_roster(&settings.traders, settings.engine.allocatable_pct())?;
    }
    Ok(settings)
}

// --- "CheckConfig" Subcommand Logic ---

fn check_config(settings: &Settings, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&settings.traders)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<20} {:<10} {:<10} {:>8} {:>10} {:>6}",
        "ID", "NAME", "EXCHANGE", "ENGINE", "ALLOC%", "INTERVAL", "AUTO"
    );
    for trader in &settings.traders {
        println!(
            "{:<16} {:<20} {:<10} {:<10} {:>8} {:>9}s {:>6}",
            trader.id,
            trader.name,
            trader.exchange_provider,
            trader.decision_engine,
            trader.allocation_pct,
            trader.decision_interval_secs,
            trader.auto_start
        );
    }
    let allocated: rust_decimal::Decimal = settings.traders.iter().map(|t| t.allocation_pct).sum();
    println!(
        "\n{} trader(s), {}% allocated of {}% allocatable.",
        settings.traders.len(),
        allocated,
        settings.engine.allocatable_pct()
    );
    Ok(())
}

// --- "Run" Subcommand Logic ---

/// Builds the engine, registers the roster and runs until Ctrl-C.
async fn run_app(settings: Settings) -> Result<()> {
    // --- 1. Component Instantiation ---
    let executor = Arc::new(OrderExecutor::new(
        settings.execution.retry_policy(),
        settings.execution.call_timeout(),
    ));
    let broadcast_sink = Arc::new(BroadcastSink::new(settings.engine.event_buffer));
    let log_sink: Arc<dyn AuditSink> = Arc::new(LogSink);
    let event_sink: Arc<dyn AuditSink> = broadcast_sink.clone();
    let sink: Arc<dyn AuditSink> = Arc::new(FanoutSink::new(vec![log_sink, event_sink]));

    let mut engine = Engine::new(
        settings.engine.clone(),
        executor,
        Arc::new(BuiltinEngineFactory),
        sink,
    );
    if let Some(paper_settings) = &settings.paper {
        let venue = paper::build(paper_settings).await;
        engine = engine
            .with_exchange(paper::PAPER_PROVIDER, venue.exchange)
            .with_market(paper::PAPER_PROVIDER, venue.market);
    } else {
        tracing::warn!("No [paper] venue configured; traders need a registered exchange to start.");
    }
    let engine = Arc::new(engine);

    // --- 2. Trader Registration ---
    register_all(&engine, settings.traders).await?;

    // --- 3. Launch Concurrent Tasks ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = StateReconciler::new(engine.clone(), settings.engine.sync_interval());
    let mut reconciler_rx = shutdown_rx.clone();
    let reconciler_handle = tokio::spawn(async move {
        reconciler
            .run(async move {
                let _ = reconciler_rx.wait_for(|stopped| *stopped).await;
            })
            .await
    });

    let watcher_handle = tokio::spawn(watch_events(broadcast_sink.subscribe(), shutdown_rx));

    tracing::info!("Launching scheduler; press Ctrl-C to stop.");
    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C; shutting down.");
            }
        })
        .await?;

    // --- 4. Shutdown ---
    shutdown_tx.send_replace(true);
    for status in engine.statuses().await {
        if status.state != TraderState::Stopped {
            engine.stop_trader(&status.id).await?;
        }
    }
    reconciler_handle.await?;
    watcher_handle.await?;
    Ok(())
}

async fn register_all(engine: &Engine, traders: Vec<TraderConfig>) -> Result<()> {
    for config in traders {
        let id = config.id.clone();
        engine
            .register_trader(config)
            .await
            .with_context(|| format!("failed to register trader '{id}'"))?;
    }
    Ok(())
}

/// Surfaces traders that drop into the error state until shutdown.
async fn watch_events(mut events: broadcast::Receiver<EngineEvent>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => return,
            event = events.recv() => match event {
                Ok(EngineEvent::TraderStateChanged { trader_id, from, to: TraderState::Error, .. }) => {
                    tracing::error!(%trader_id, %from, "Trader entered error state; restart it once the cause is fixed.");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event watcher lagged behind.");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}
