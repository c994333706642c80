//! Settlement Use Case - Ticket Resolution and Payouts
//!
//! Settles approved tickets once every bet on them has resolved.
//! A ticket wins only if all of its bets won; winners are paid
//! `stake * sum(odds)` through the wallet ledger.
//!
//! Settlement flow:
//! 1. Load settleable tickets from the store
//! 2. Resolve each ticket as Won or Lost
//! 3. Persist the settled ticket
//! 4. Credit the payout for winners
//!
//! Each ticket is settled in its own failure boundary. A ticket is
//! persisted before its payout, so a failed write never pays out on an
//! unsettled ticket. The store refuses to rewrite a settled ticket;
//! when two sweeps race for one ticket, the loser skips it unpaid.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::{Ticket, TicketStatus};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::journal::SettlementRecord;
use crate::ports::store::{ChangeSet, Store};

use super::wallet_ledger::WalletLedger;

/// Summary of a single ticket settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
  pub ticket_id: Uuid,
  /// Won or Lost when settled.
  pub status: Option<TicketStatus>,
  pub stake: Decimal,
  pub payout: Option<Decimal>,
  pub bet_count: usize,
  /// Whether settlement succeeded.
  pub success: bool,
  /// Error message if settlement failed.
  pub error: Option<String>,
}

impl SettlementResult {
  fn settled(ticket: &Ticket) -> Self {
    Self {
      ticket_id: ticket.id,
      status: Some(ticket.status()),
      stake: ticket.total_stake,
      payout: ticket.total_payout(),
      bet_count: ticket.bets().len(),
      success: true,
      error: None,
    }
  }

  fn failed(ticket: &Ticket, error: impl std::fmt::Display) -> Self {
    Self {
      ticket_id: ticket.id,
      status: None,
      stake: ticket.total_stake,
      payout: None,
      bet_count: ticket.bets().len(),
      success: false,
      error: Some(error.to_string()),
    }
  }

  pub fn is_won(&self) -> bool {
    self.status == Some(TicketStatus::Won)
  }

  pub fn is_lost(&self) -> bool {
    self.status == Some(TicketStatus::Lost)
  }
}

/// Aggregated report from a settlement sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
  /// Individual settlement results.
  pub results: Vec<SettlementResult>,
  /// Tickets settled as Won or Lost.
  pub processed: usize,
  pub won: usize,
  pub lost: usize,
  /// Tickets that failed settlement.
  pub failed: usize,
  /// Tickets another settler got to first.
  pub skipped: usize,
  /// Total credited to the ledger across all winners.
  pub total_payouts: Decimal,
  /// Timestamp of the sweep.
  pub timestamp: DateTime<Utc>,
}

impl SettlementReport {
  pub fn from_results(results: Vec<SettlementResult>, timestamp: DateTime<Utc>) -> Self {
    let won = results.iter().filter(|r| r.success && r.is_won()).count();
    let lost = results.iter().filter(|r| r.success && r.is_lost()).count();
    let failed = results.iter().filter(|r| !r.success).count();
    let total_payouts = results
      .iter()
      .filter(|r| r.success)
      .filter_map(|r| r.payout)
      .sum();

    Self {
      results,
      processed: won + lost,
      won,
      lost,
      failed,
      skipped: 0,
      total_payouts,
      timestamp,
    }
  }

  /// Journal entries for the successfully settled tickets.
  pub fn records(&self) -> Vec<SettlementRecord> {
    self
      .results
      .iter()
      .filter(|r| r.success)
      .filter_map(|r| {
        r.status.map(|status| SettlementRecord {
          ticket_id: r.ticket_id,
          status,
          stake: r.stake,
          payout: r.payout,
          bet_count: r.bet_count,
          settled_at: self.timestamp,
        })
      })
      .collect()
  }
}

/// Ticket settlement service.
pub struct TicketSettlement<S: Store> {
  store: Arc<S>,
  ledger: Arc<WalletLedger>,
}

impl<S: Store> TicketSettlement<S> {
  pub fn new(store: Arc<S>, ledger: Arc<WalletLedger>) -> Self {
    Self { store, ledger }
  }

  /// Settle every ticket whose bets have all resolved.
  #[instrument(skip(self))]
  pub async fn sweep(&self, now: DateTime<Utc>) -> ExchangeResult<SettlementReport> {
    let tickets = self.store.settleable_tickets().await?;
    if tickets.is_empty() {
      debug!("No settleable tickets");
      return Ok(SettlementReport::from_results(Vec::new(), now));
    }
    info!(ticket_count = tickets.len(), "Starting settlement sweep");

    let mut results = Vec::with_capacity(tickets.len());
    let mut skipped = 0;
    for mut ticket in tickets {
      match self.settle(&mut ticket, now).await {
        Ok(()) => results.push(SettlementResult::settled(&ticket)),
        Err(e) if e.is_write_conflict() => {
          debug!(ticket_id = %ticket.id, reason = %e, "Ticket already settled, skipping");
          skipped += 1;
        }
        Err(e) => {
          error!(ticket_id = %ticket.id, error = %e, "Ticket settlement failed");
          results.push(SettlementResult::failed(&ticket, e));
        }
      }
    }

    let mut report = SettlementReport::from_results(results, now);
    report.skipped = skipped;
    info!(
      processed = report.processed,
      won = report.won,
      lost = report.lost,
      failed = report.failed,
      skipped,
      total_payouts = %report.total_payouts,
      "Settlement sweep complete"
    );
    Ok(report)
  }

  /// Settle one ticket by id.
  #[instrument(skip(self))]
  pub async fn settle_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> ExchangeResult<SettlementResult> {
    let mut ticket = self
      .store
      .ticket(ticket_id)
      .await?
      .ok_or_else(|| ExchangeError::not_found("ticket", ticket_id))?;
    self.settle(&mut ticket, now).await?;
    Ok(SettlementResult::settled(&ticket))
  }

  async fn settle(&self, ticket: &mut Ticket, now: DateTime<Utc>) -> ExchangeResult<()> {
    let payout = ticket.process_result(now)?;
    self.store.commit(ChangeSet::with_ticket(ticket.clone())).await?;

    match payout {
      Some(amount) => {
        self.ledger.add_payout(amount, ticket.id)?;
        info!(ticket_id = %ticket.id, payout = %amount, "Ticket won");
      }
      None => debug!(ticket_id = %ticket.id, "Ticket lost"),
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn result(status: Option<TicketStatus>, payout: Option<Decimal>, success: bool) -> SettlementResult {
    SettlementResult {
      ticket_id: Uuid::new_v4(),
      status,
      stake: dec!(10),
      payout,
      bet_count: 1,
      success,
      error: (!success).then(|| "store unavailable".to_string()),
    }
  }

  #[test]
  fn test_settlement_report_aggregation() {
    let results = vec![
      result(Some(TicketStatus::Won), Some(dec!(25)), true),
      result(Some(TicketStatus::Lost), None, true),
      result(None, None, false),
      result(Some(TicketStatus::Won), Some(dec!(40.50)), true),
    ];

    let report = SettlementReport::from_results(results, Utc::now());
    assert_eq!(report.processed, 3);
    assert_eq!(report.won, 2);
    assert_eq!(report.lost, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total_payouts, dec!(65.50));
  }

  #[test]
  fn test_records_skip_failures() {
    let results = vec![
      result(Some(TicketStatus::Won), Some(dec!(25)), true),
      result(None, None, false),
    ];
    let report = SettlementReport::from_results(results, Utc::now());
    let records = report.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TicketStatus::Won);
    assert_eq!(records[0].payout, Some(dec!(25)));
  }

  #[test]
  fn test_empty_report() {
    let report = SettlementReport::from_results(Vec::new(), Utc::now());
    assert_eq!(report.processed, 0);
    assert_eq!(report.total_payouts, Decimal::ZERO);
  }
}
