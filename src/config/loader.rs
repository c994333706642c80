//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "DOGRACE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Config path from `DOGRACE_CONFIG`, falling back to `config.toml`.
pub fn config_path() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    path = %path.display(),
    min_active_races = config.limits.min_active_races,
    odds_model = ?config.schedule.odds_model,
    seeded = config.simulation.seed.is_some(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  let schedule = &config.schedule;
  anyhow::ensure!(
    schedule.lifecycle_interval_ms > 0 && schedule.settlement_interval_ms > 0,
    "Loop intervals must be positive"
  );
  anyhow::ensure!(
    schedule.race_duration_secs > 0,
    "race_duration_secs must be positive, got {}",
    schedule.race_duration_secs
  );
  anyhow::ensure!(
    schedule.betting_close_lead_secs >= 0 && schedule.race_interval_secs >= 0,
    "betting_close_lead_secs and race_interval_secs must not be negative"
  );

  anyhow::ensure!(
    config.wallet.starting_balance >= Decimal::ZERO,
    "starting_balance must not be negative, got {}",
    config.wallet.starting_balance
  );

  let limits = &config.limits;
  anyhow::ensure!(
    limits.min_ticket_stake > Decimal::ZERO,
    "min_ticket_stake must be positive, got {}",
    limits.min_ticket_stake
  );
  anyhow::ensure!(
    limits.max_ticket_win > limits.min_ticket_stake,
    "max_ticket_win ({}) must exceed min_ticket_stake ({})",
    limits.max_ticket_win,
    limits.min_ticket_stake
  );
  anyhow::ensure!(limits.min_active_races > 0, "min_active_races must be positive");

  anyhow::ensure!(!config.persistence.data_dir.is_empty(), "data_dir must not be empty");

  Ok(())
}
