//! Journal Port - Append-Only Audit Interface
//!
//! Ledger transactions and ticket settlements are appended as JSON
//! Lines. Each line is a self-contained record, so a partial write
//! loses at most the final entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{TicketStatus, WalletTransaction};

/// One settled ticket for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
  pub ticket_id: Uuid,
  /// Won or Lost.
  pub status: TicketStatus,
  pub stake: Decimal,
  pub payout: Option<Decimal>,
  pub bet_count: usize,
  pub settled_at: DateTime<Utc>,
}

#[async_trait]
pub trait Journal: Send + Sync + 'static {
  /// Append ledger transactions in order.
  async fn append_transactions(&self, entries: &[WalletTransaction]) -> anyhow::Result<()>;

  /// Append ticket settlements.
  async fn append_settlements(&self, records: &[SettlementRecord]) -> anyhow::Result<()>;

  /// Load every journaled ledger transaction, oldest first.
  async fn load_transactions(&self) -> anyhow::Result<Vec<WalletTransaction>>;

  /// Check if the journal is writable.
  async fn is_healthy(&self) -> bool;
}
