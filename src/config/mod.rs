//! Configuration Module - TOML-based Exchange Configuration
//!
//! Loads and validates configuration from `config.toml`. Every timing
//! knob, limit and bind address is externalized here; the domain
//! layer only sees the values these sections produce.

pub mod loader;

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::domain::{GlobalConfiguration, OddsModel};
use crate::usecases::race_lifecycle::LifecycleSettings;
use crate::usecases::scheduler::SchedulerSettings;

/// Top-level exchange configuration.
///
/// Loaded from `config.toml` at startup. Every section is optional
/// and falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  /// Service identity and health endpoint.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Loop intervals and race timing.
  #[serde(default)]
  pub schedule: ScheduleConfig,
  /// House wallet.
  #[serde(default)]
  pub wallet: WalletConfig,
  /// Betting limits seeded into the store.
  #[serde(default)]
  pub limits: LimitsConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Randomness control.
  #[serde(default)]
  pub simulation: SimulationConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Health check server bind address.
  #[serde(default = "default_health_bind")]
  pub health_bind: String,
}

/// Scheduler and race timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
  /// Delay after each lifecycle tick (milliseconds).
  #[serde(default = "default_lifecycle_interval")]
  pub lifecycle_interval_ms: u64,
  /// Delay after each settlement tick (milliseconds).
  #[serde(default = "default_settlement_interval")]
  pub settlement_interval_ms: u64,
  /// Betting closes this many seconds before a race starts.
  #[serde(default = "default_close_lead")]
  pub betting_close_lead_secs: i64,
  #[serde(default = "default_race_duration")]
  pub race_duration_secs: i64,
  /// Gap between consecutive races (seconds).
  #[serde(default = "default_race_interval")]
  pub race_interval_secs: i64,
  #[serde(default)]
  pub odds_model: OddsModel,
}

/// House wallet configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
  /// Balance used when no snapshot is restored.
  #[serde(default = "default_starting_balance")]
  pub starting_balance: Decimal,
  /// Queue ledger entries for the JSONL journal.
  #[serde(default = "default_true")]
  pub journaling: bool,
}

/// Betting limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
  #[serde(default = "default_min_stake")]
  pub min_ticket_stake: Decimal,
  #[serde(default = "default_max_win")]
  pub max_ticket_win: Decimal,
  /// Races kept open for betting at all times.
  #[serde(default = "default_min_active_races")]
  pub min_active_races: usize,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the journal and snapshot.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Write `snapshot.json` on graceful shutdown.
  #[serde(default = "default_true")]
  pub snapshot_on_shutdown: bool,
}

/// Randomness configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
  /// Fixed RNG seed; entropy when absent.
  pub seed: Option<u64>,
}

impl AppConfig {
  pub fn global_configuration(&self) -> GlobalConfiguration {
    GlobalConfiguration {
      min_ticket_stake: self.limits.min_ticket_stake,
      max_ticket_win: self.limits.max_ticket_win,
      min_active_races: self.limits.min_active_races,
    }
  }

  pub fn lifecycle_settings(&self) -> LifecycleSettings {
    LifecycleSettings {
      betting_close_lead: chrono::Duration::seconds(self.schedule.betting_close_lead_secs),
      race_duration_secs: self.schedule.race_duration_secs,
      race_interval: chrono::Duration::seconds(self.schedule.race_interval_secs),
      odds_model: self.schedule.odds_model,
    }
  }

  pub fn scheduler_settings(&self) -> SchedulerSettings {
    SchedulerSettings {
      lifecycle_interval: Duration::from_millis(self.schedule.lifecycle_interval_ms),
      settlement_interval: Duration::from_millis(self.schedule.settlement_interval_ms),
    }
  }
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
      health_bind: default_health_bind(),
    }
  }
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      lifecycle_interval_ms: default_lifecycle_interval(),
      settlement_interval_ms: default_settlement_interval(),
      betting_close_lead_secs: default_close_lead(),
      race_duration_secs: default_race_duration(),
      race_interval_secs: default_race_interval(),
      odds_model: OddsModel::default(),
    }
  }
}

impl Default for WalletConfig {
  fn default() -> Self {
    Self {
      starting_balance: default_starting_balance(),
      journaling: true,
    }
  }
}

impl Default for LimitsConfig {
  fn default() -> Self {
    Self {
      min_ticket_stake: default_min_stake(),
      max_ticket_win: default_max_win(),
      min_active_races: default_min_active_races(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_on_shutdown: true,
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "dograce-exchange".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_health_bind() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
  true
}

fn default_lifecycle_interval() -> u64 {
  2_000
}

fn default_settlement_interval() -> u64 {
  5_000
}

fn default_close_lead() -> i64 {
  5
}

fn default_race_duration() -> i64 {
  10
}

fn default_race_interval() -> i64 {
  5
}

fn default_starting_balance() -> Decimal {
  dec!(100)
}

fn default_min_stake() -> Decimal {
  dec!(1.00)
}

fn default_max_win() -> Decimal {
  dec!(10000.00)
}

fn default_min_active_races() -> usize {
  7
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}
