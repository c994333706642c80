//! Dog-Race Exchange - Entry Point
//!
//! Initializes configuration, logging, persistence and the background
//! scheduler. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or $DOGRACE_CONFIG) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the shutdown broadcast channel
//! 4. Restore the store and wallet from snapshot.json when present
//! 5. Open the JSONL journal
//! 6. Create the lifecycle, settlement and scheduler services
//! 7. Spawn health server (/live + /ready) and metrics server (/metrics)
//! 8. Spawn the lifecycle and settlement loops
//! 9. Wait for SIGINT → graceful shutdown (stop loops→flush→snapshot→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use dograce_exchange::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use dograce_exchange::adapters::persistence::{InMemoryStore, JsonlJournal, SnapshotFile};
use dograce_exchange::config;
use dograce_exchange::usecases::{RaceLifecycle, Scheduler, TicketSettlement, WalletLedger};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = config::loader::config_path();
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        min_active_races = config.limits.min_active_races,
        "Starting dog-race exchange"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Restore store and wallet ─────────────────────────
    let snapshots = SnapshotFile::new(&config.persistence.data_dir)
        .await
        .context("Failed to open snapshot directory")?;
    let (store, starting_balance) = match snapshots.load().await.context("Failed to load snapshot")? {
        Some(snapshot) => {
            // Funds reserved by in-flight placements return to the balance.
            let balance = snapshot
                .wallet
                .map_or(config.wallet.starting_balance, |w| w.balance + w.reserved);
            let store = InMemoryStore::from_snapshot(snapshot);
            // Configured limits win over those stored in the snapshot.
            store.set_global_configuration(config.global_configuration()).await;
            (Arc::new(store), balance)
        }
        None => (
            Arc::new(InMemoryStore::new(config.global_configuration())),
            config.wallet.starting_balance,
        ),
    };

    let ledger = Arc::new(if config.wallet.journaling {
        WalletLedger::with_journaling(starting_balance)?
    } else {
        WalletLedger::new(starting_balance)?
    });
    info!(balance = %starting_balance, "Wallet ledger ready");

    // ── 5. Open the JSONL journal ───────────────────────────
    let journal = Arc::new(
        JsonlJournal::new(&config.persistence.data_dir)
            .await
            .context("Failed to open journal")?,
    );

    // ── 6. Create services ──────────────────────────────────
    let lifecycle = Arc::new(match config.simulation.seed {
        Some(seed) => {
            warn!(seed, "Deterministic RNG seed configured");
            RaceLifecycle::with_seed(Arc::clone(&store), config.lifecycle_settings(), seed)
        }
        None => RaceLifecycle::new(Arc::clone(&store), config.lifecycle_settings()),
    });
    let settlement = Arc::new(TicketSettlement::new(Arc::clone(&store), Arc::clone(&ledger)));
    let health = Arc::new(HealthState::new());

    let mut scheduler = Scheduler::new(
        lifecycle,
        settlement,
        Arc::clone(&ledger),
        Arc::clone(&health),
        config.scheduler_settings(),
    );
    if config.wallet.journaling {
        scheduler = scheduler.with_journal(journal);
    }

    // ── 7. Spawn health and metrics servers ─────────────────
    let health_server = HealthServer::new(Arc::clone(&health), config.service.health_bind.clone());
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
        scheduler = scheduler.with_metrics(Arc::clone(&metrics));
        let bind = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 8. Spawn scheduler loops ────────────────────────────
    let (lifecycle_handle, settlement_handle) = Arc::new(scheduler).spawn(&shutdown_tx);

    info!("All tasks spawned, exchange is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    // 2. Wait for the loops to finish their current tick (up to 30s)
    for (name, handle) in [("lifecycle", lifecycle_handle), ("settlement", settlement_handle)] {
        if tokio::time::timeout(Duration::from_secs(30), handle).await.is_err() {
            warn!(loop_name = name, "Loop did not stop within 30s");
        }
    }

    // 3. Save snapshot
    if config.persistence.snapshot_on_shutdown {
        let mut snapshot = store.snapshot().await;
        snapshot.wallet = Some(ledger.status());
        if let Err(e) = snapshots.save(&snapshot).await {
            error!(error = %e, "Failed to save snapshot");
        }
    }

    // 4. Stop servers
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!(wallet = %ledger.status(), "Shutdown complete");
    Ok(())
}
