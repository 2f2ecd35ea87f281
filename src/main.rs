//! Pingwatch Monitor
//!
//! Run with: cargo run -- --config config/pingwatch.yaml
//!
//! Environment variables:
//! - PINGWATCH_CONFIG: Configuration file used when `--config` is not given
//!   (default: config/pingwatch.yaml)
//! - RUST_LOG: Log level (default: pingwatch=info)

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pingwatch::alerts::TargetNotifier;
use pingwatch::api::run_server;
use pingwatch::config::{Config, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use pingwatch::monitor::{HttpProber, Monitor};
use pingwatch::state::{prune::DEFAULT_PRUNE_INTERVAL, FileBackend, PruneWorker, StateStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pingwatch", version, about = "HTTP(S) endpoint availability monitor")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate the configuration, probe every endpoint once and exit
    #[arg(long, conflicts_with_all = ["status", "send_report"])]
    test_config: bool,

    /// Print the persisted status of every endpoint and exit
    #[arg(long, conflicts_with = "send_report")]
    status: bool,

    /// Send a summary report through the configured notifiers and exit
    #[arg(long)]
    send_report: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pingwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load(&config_path)?;

    tracing::info!("Pingwatch configuration:");
    tracing::info!("  Config file: {}", config_path.display());
    tracing::info!("  Monitors: {}", config.monitors.len());
    tracing::info!("  Default check interval: {} seconds", config.check_interval);
    tracing::info!("  State directory: {}", config.state_dir.display());
    tracing::info!("  Notification targets: {}", config.notify.len());

    let backend = Arc::new(FileBackend::new(&config.state_dir)?);
    let store = Arc::new(StateStore::open(backend)?);
    let monitor = Arc::new(
        Monitor::new(
            config.endpoints(),
            Arc::new(HttpProber::new()?),
            Arc::new(TargetNotifier::new(config.notify.clone())?),
            Arc::clone(&store),
        )
        .with_shutdown_grace(config.shutdown_grace()),
    );

    if cli.status {
        print_status(&monitor);
        return Ok(());
    }

    if cli.send_report {
        match monitor.send_report().await {
            Ok(report) => {
                println!("Summary report sent ({} URLs)", report.summary.total);
                return Ok(());
            }
            Err(e) => {
                println!("Failed to send summary report: {}", e);
                std::process::exit(1);
            }
        }
    }

    if cli.test_config {
        println!("Configuration is valid");
        let mut unreachable = 0;
        for endpoint in monitor.endpoints() {
            let outcome = monitor.test_connectivity(endpoint).await;
            let verdict = if outcome.success { "OK" } else { "FAILED" };
            println!("  [{}] {} ({})", verdict, endpoint.url, outcome.detail());
            if !outcome.success {
                unreachable += 1;
            }
        }
        if unreachable > 0 {
            println!("{} endpoint(s) unreachable", unreachable);
            std::process::exit(1);
        }
        return Ok(());
    }

    println!(
        r#"
        _                             _       _
  _ __ (_)_ __   __ ___      ____ _| |_ ___| |__
 | '_ \| | '_ \ / _` \ \ /\ / / _` | __/ __| '_ \
 | |_) | | | | | (_| |\ V  V / (_| | || (__| | | |
 | .__/|_|_| |_|\__, | \_/\_/ \__,_|\__\___|_| |_|
 |_|            |___/

 HTTP(S) Endpoint Availability Monitor
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received, stopping monitor..."),
            Err(e) => tracing::error!(error = %e, "Failed to listen for CTRL+C; stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    let prune_handle = config.prune_after().map(|max_age| {
        let worker = Arc::new(PruneWorker::new(
            Arc::clone(&store),
            DEFAULT_PRUNE_INTERVAL,
            max_age,
        ));
        worker.start(shutdown_rx.clone())
    });

    let api_handle = config.api.clone().map(|api| {
        let monitor = Arc::clone(&monitor);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(api, monitor, shutdown).await {
                tracing::error!(error = %e, "Status API failed");
            }
        })
    });

    monitor.run_forever(shutdown_rx).await?;

    if let Some(handle) = api_handle {
        let _ = handle.await;
    }
    if let Some(handle) = prune_handle {
        let _ = handle.await;
    }

    tracing::info!("Pingwatch shutdown complete");
    Ok(())
}

fn print_status(monitor: &Monitor) {
    let summary = monitor.summary();
    println!("Pingwatch Status Summary:");
    println!("Total URLs: {}", summary.total);
    println!("Up: {}", summary.up);
    println!("Down: {}", summary.down);
    println!("Unknown: {}", summary.unknown);

    for status in monitor.statuses() {
        let last_checked = status
            .state
            .last_checked_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<8} {} (last check: {}, failures in a row: {})",
            status.state.status.to_string(),
            status.url,
            last_checked,
            status.state.consecutive_failures
        );
    }
}
