//! Scheduler - Lifecycle and Settlement Polling Loops
//!
//! Drives the exchange forward in time with two independent loops.
//! Each loop runs one tick to completion, then sleeps a fixed delay,
//! so a slow tick only delays the next one.
//!
//! Lifecycle tick:
//! 1. Close, start and finish due races
//! 2. Top up the pool of active races
//! 3. Record transition metrics
//!
//! Settlement tick:
//! 1. Settle every ticket whose bets have all resolved
//! 2. Journal queued ledger transactions and settlement records
//! 3. Record settlement and wallet metrics
//!
//! A failed tick is logged and the loop keeps going.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::ports::journal::Journal;
use crate::ports::store::Store;

use super::race_lifecycle::{LifecycleTick, RaceLifecycle};
use super::settlement::{SettlementReport, TicketSettlement};
use super::wallet_ledger::WalletLedger;

/// Delay between the end of one tick and the start of the next.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
  pub lifecycle_interval: Duration,
  pub settlement_interval: Duration,
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self {
      lifecycle_interval: Duration::from_secs(2),
      settlement_interval: Duration::from_secs(5),
    }
  }
}

/// Background driver for race transitions and ticket settlement.
pub struct Scheduler<S: Store> {
  lifecycle: Arc<RaceLifecycle<S>>,
  settlement: Arc<TicketSettlement<S>>,
  ledger: Arc<WalletLedger>,
  health: Arc<HealthState>,
  journal: Option<Arc<dyn Journal>>,
  metrics: Option<Arc<MetricsRegistry>>,
  settings: SchedulerSettings,
}

impl<S: Store> Scheduler<S> {
  pub fn new(
    lifecycle: Arc<RaceLifecycle<S>>,
    settlement: Arc<TicketSettlement<S>>,
    ledger: Arc<WalletLedger>,
    health: Arc<HealthState>,
    settings: SchedulerSettings,
  ) -> Self {
    Self {
      lifecycle,
      settlement,
      ledger,
      health,
      journal: None,
      metrics: None,
      settings,
    }
  }

  pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
    self.journal = Some(journal);
    self
  }

  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Run one lifecycle tick.
  ///
  /// The store is reported unhealthy while any step or race fails.
  pub async fn lifecycle_tick(&self) -> LifecycleTick {
    let start = Instant::now();
    let tick = self.lifecycle.tick(Utc::now()).await;
    self.observe("lifecycle", start);

    self.health.set_store_healthy(tick.is_clean());
    if let Some(metrics) = &self.metrics {
      for report in [&tick.closures, &tick.starts, &tick.finishes] {
        metrics.record_transitions(
          report.stage.as_str(),
          report.transitioned,
          report.skipped,
          report.failed,
        );
      }
      metrics.record_pool(tick.pool.created, tick.pool.active_after);
    }

    if tick.errors.is_empty() {
      debug!(
        closed = tick.closures.transitioned,
        started = tick.starts.transitioned,
        finished = tick.finishes.transitioned,
        created = tick.pool.created,
        "Lifecycle tick complete"
      );
    } else {
      error!(errors = ?tick.errors, "Lifecycle tick had failing steps");
    }
    tick
  }

  /// Run one settlement tick, returning `None` if the sweep failed.
  ///
  /// Ledger entries are journaled even when the sweep fails, since
  /// placements keep writing to the ledger between ticks.
  pub async fn settlement_tick(&self) -> Option<SettlementReport> {
    let start = Instant::now();
    let outcome = self.settlement.sweep(Utc::now()).await;

    let report = match outcome {
      Ok(report) => {
        self.health.set_store_healthy(true);
        if let Some(metrics) = &self.metrics {
          metrics.record_settlement(report.won, report.lost, report.failed, report.total_payouts);
        }
        Some(report)
      }
      Err(e) => {
        self.health.set_store_healthy(false);
        error!(error = %e, "Settlement tick failed");
        None
      }
    };

    self.flush_journal(report.as_ref()).await;
    if let Some(metrics) = &self.metrics {
      metrics.record_wallet(&self.ledger.status());
    }
    self.observe("settlement", start);
    report
  }

  /// Append queued ledger entries and settlement records to the journal.
  ///
  /// Ledger entries that fail to write go back to the front of the
  /// queue for the next tick.
  async fn flush_journal(&self, report: Option<&SettlementReport>) {
    let Some(journal) = &self.journal else {
      return;
    };

    let entries = self.ledger.take_unjournaled();
    if !entries.is_empty() {
      if let Err(e) = journal.append_transactions(&entries).await {
        warn!(error = %e, count = entries.len(), "Failed to journal ledger entries, requeueing");
        self.ledger.requeue_unjournaled(entries);
      }
    }

    if let Some(report) = report {
      let records = report.records();
      if !records.is_empty() {
        if let Err(e) = journal.append_settlements(&records).await {
          error!(error = %e, count = records.len(), "Failed to journal settlements");
        }
      }
    }
  }

  fn observe(&self, loop_name: &str, start: Instant) {
    if let Some(metrics) = &self.metrics {
      metrics.observe_tick(loop_name, start.elapsed().as_secs_f64());
    }
  }

  /// Lifecycle loop: tick, then sleep, until shutdown.
  pub async fn run_lifecycle_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(
      interval_ms = self.settings.lifecycle_interval.as_millis() as u64,
      "Lifecycle loop started"
    );
    self.health.set_lifecycle_running(true);

    loop {
      self.lifecycle_tick().await;

      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping lifecycle loop");
          break;
        }
        () = tokio::time::sleep(self.settings.lifecycle_interval) => {}
      }
    }

    self.health.set_lifecycle_running(false);
  }

  /// Settlement loop: tick, then sleep, until shutdown.
  ///
  /// A final tick runs on shutdown so queued journal entries are written.
  pub async fn run_settlement_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(
      interval_ms = self.settings.settlement_interval.as_millis() as u64,
      "Settlement loop started"
    );
    self.health.set_settlement_running(true);

    loop {
      self.settlement_tick().await;

      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping settlement loop");
          break;
        }
        () = tokio::time::sleep(self.settings.settlement_interval) => {}
      }
    }

    self.flush_journal(None).await;
    self.health.set_settlement_running(false);
  }

  /// Spawn both loops on the runtime.
  pub fn spawn(self: Arc<Self>, shutdown_tx: &broadcast::Sender<()>) -> (JoinHandle<()>, JoinHandle<()>) {
    let lifecycle = tokio::spawn(Arc::clone(&self).run_lifecycle_loop(shutdown_tx.subscribe()));
    let settlement = tokio::spawn(self.run_settlement_loop(shutdown_tx.subscribe()));
    (lifecycle, settlement)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::persistence::InMemoryStore;
  use crate::domain::GlobalConfiguration;
  use crate::usecases::race_lifecycle::LifecycleSettings;
  use rust_decimal_macros::dec;

  fn scheduler() -> (Arc<Scheduler<InMemoryStore>>, Arc<HealthState>) {
    let store = Arc::new(InMemoryStore::new(GlobalConfiguration::default()));
    let ledger = Arc::new(WalletLedger::new(dec!(100)).unwrap());
    let health = Arc::new(HealthState::new());
    let lifecycle = Arc::new(RaceLifecycle::with_seed(
      Arc::clone(&store),
      LifecycleSettings::default(),
      3,
    ));
    let settlement = Arc::new(TicketSettlement::new(Arc::clone(&store), Arc::clone(&ledger)));
    let settings = SchedulerSettings {
      lifecycle_interval: Duration::from_millis(10),
      settlement_interval: Duration::from_millis(10),
    };
    let scheduler = Scheduler::new(lifecycle, settlement, ledger, Arc::clone(&health), settings)
      .with_metrics(Arc::new(MetricsRegistry::new().unwrap()));
    (Arc::new(scheduler), health)
  }

  #[tokio::test]
  async fn test_lifecycle_tick_fills_pool() {
    let (scheduler, _) = scheduler();
    let tick = scheduler.lifecycle_tick().await;
    assert!(tick.is_clean());
    assert_eq!(tick.pool.created, 7);
    assert_eq!(tick.pool.active_after, 7);
  }

  #[tokio::test]
  async fn test_empty_settlement_tick() {
    let (scheduler, _) = scheduler();
    let report = scheduler.settlement_tick().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 0);
  }

  #[tokio::test]
  async fn test_loops_stop_on_shutdown() {
    let (scheduler, health) = scheduler();
    let (shutdown_tx, _) = broadcast::channel(1);
    let (lifecycle, settlement) = scheduler.spawn(&shutdown_tx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(health.is_ready());

    shutdown_tx.send(()).unwrap();
    lifecycle.await.unwrap();
    settlement.await.unwrap();
    assert!(!health.is_ready());
  }
}
