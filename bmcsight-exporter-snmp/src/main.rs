//! Prometheus exporter for BMC sensors read over SNMP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use bmcsight_common::init_tracing;
use bmcsight_exporter_snmp::{ExporterConfig, HttpServer, ProfileRegistry, SnmpWalker};

/// Prometheus exporter for BMC sensors read over SNMP.
#[derive(Parser, Debug)]
#[command(name = "bmcsight-exporter-snmp")]
#[command(about = "Export BMC sensor readings walked over SNMP as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExporterConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => ExporterConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.http.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging).context("Failed to initialize tracing")?;

    let registry = ProfileRegistry::from_config(&config.profiles)
        .context("Failed to build device profiles")?;

    info!(
        config = ?args.config,
        device_types = ?registry.device_types().collect::<Vec<_>>(),
        snmp_version = ?config.snmp.version,
        "Starting BMCSight SNMP exporter"
    );

    let listen_addr: SocketAddr = config
        .http
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.http.listen))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(
        Arc::new(registry),
        Arc::new(SnmpWalker::new(&config.snmp)),
        listen_addr,
        config.http.path.clone(),
        Duration::from_secs(config.snmp.scrape_timeout_secs),
    );

    let mut http_task = tokio::spawn(http_server.run(shutdown_rx));

    tokio::select! {
        result = &mut http_task => {
            // The server only stops on its own when it failed to start or crashed.
            result.context("HTTP server task failed")??;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
        _ = shutdown_signal() => {}
    }

    // The receiver lives in the server task; a send error means it already ended.
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), http_task).await {
        Ok(result) => result.context("HTTP server task failed")??,
        Err(_) => error!("HTTP server did not stop within 5s"),
    }

    info!("Exporter stopped");
    Ok(())
}

/// Wait for Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
