//! custodyd - Custody Event Relay Daemon
//!
//! Opens the custody ledger, subscribes to one package's committed
//! transition events, and forwards each one to the configured downstream
//! channel.

use custody_core::PackageId;
use custody_ledger::{EventCursor, Ledger};
use custody_relay::{Config, EventRelay, LogPublisher, Publisher, TcpPublisher};
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if CUSTODY_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("CUSTODY_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("CUSTODY_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting custodyd");
    tracing::info!("  Data directory: {}", config.ledger.data_dir.display());
    tracing::info!("  Package: {}", config.relay.package_id);
    tracing::info!("  Channel: {}", config.relay.channel);

    let ledger = Ledger::open(&config.ledger.data_dir)?;

    let publisher: Box<dyn Publisher> = match config.relay.target_addr {
        Some(addr) => {
            tracing::info!("  Target: {}", addr);
            Box::new(TcpPublisher::new(addr, config.relay.access_token.clone()))
        }
        None => {
            tracing::info!("  Target: none (logging envelopes)");
            Box::new(LogPublisher::new())
        }
    };

    let package_id = PackageId::from(config.relay.package_id.clone());

    // The record may not exist yet on a fresh ledger; wait for it.
    let cursor = tokio::select! {
        cursor = wait_for_record(&ledger, &package_id, config.relay.start_from) => cursor,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal before record appeared, exiting");
            return Ok(());
        }
    };

    let relay = EventRelay::new(
        cursor,
        publisher,
        config.relay.channel.clone(),
        config.relay.retry_interval(),
    );

    // Spawn shutdown signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping relay...");
        let _ = shutdown_tx.send(true);
    });

    // Run relay (blocks until shutdown)
    relay.run(shutdown_rx).await;

    tracing::info!("custodyd stopped");
    Ok(())
}

/// Polls the ledger until the tracked package's record exists.
async fn wait_for_record(ledger: &Ledger, package_id: &PackageId, start_from: u64) -> EventCursor {
    let mut logged = false;
    loop {
        match ledger.subscribe(package_id, start_from) {
            Ok(cursor) => return cursor,
            Err(e) => {
                if !logged {
                    tracing::warn!(package_id = %package_id, error = %e, "record not found yet, waiting");
                    logged = true;
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
