//! Leakwatch Binary Entry Point
//!
//! Polls the configured management controller and either prints one
//! exposition (`--once`) or keeps scraping until interrupted.
//! Core functionality is provided by the `leakwatch` library crate.

use std::time::Duration;

use clap::Parser;
use leakwatch::config::parse_duration;
use leakwatch::{AppConfig, Exporter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Leakwatch - Redfish Leak-Detector Telemetry
#[derive(Parser, Debug)]
#[command(name = "leakwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "LEAKWATCH_CONFIG")]
    config: Option<String>,

    /// Management controller base URL (overrides config file)
    #[arg(long, env = "LEAKWATCH_BASE_URL")]
    base_url: Option<String>,

    /// Basic-auth user (overrides config file)
    #[arg(short, long, env = "LEAKWATCH_USER")]
    user: Option<String>,

    /// Basic-auth password (overrides config file)
    #[arg(short, long, env = "LEAKWATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Scrape interval, e.g. `30s` or `1m` (overrides config file)
    #[arg(short, long, env = "LEAKWATCH_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Scrape once, print the exposition to stdout and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leakwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration; a bare --base-url runs with defaults
    let mut config = match (&cli.config, &cli.base_url) {
        (Some(path), _) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        (None, Some(base_url)) => AppConfig::for_target(base_url.clone()),
        (None, None) => return Err("either --config or --base-url is required".into()),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(base_url) = cli.base_url {
        config.target.base_url = base_url;
    }
    if let Some(user) = cli.user {
        config.target.username = Some(user);
    }
    if let Some(password) = cli.password {
        config.target.password = Some(password);
    }
    if let Some(interval) = cli.interval {
        config.scrape.interval = interval;
    }

    let exporter = Exporter::new(&config)?;
    let cancel = CancellationToken::new();

    if cli.once {
        let report = exporter.scrape_once(&cancel).await;
        print!("{}", exporter.registry().encode_text()?);
        if !report.all_succeeded() {
            tracing::warn!(%report, "Some scrapes failed");
        }
        return Ok(());
    }

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::spawn(shutdown_signal(cancel.clone()));
    exporter.run(cancel).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down exporter...");
    token.cancel();
}
