//! Wallet Ledger Use Case - Shared Fund Store
//!
//! Wraps the `Wallet` state machine in a single mutex so reserve,
//! commit, release, payout and reset each run as one critical section.
//! The lock is synchronous and never held across an `.await`.
//!
//! When journaling is enabled, every appended transaction is also
//! queued in an outbox that the scheduler drains into the journal.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DomainError, Wallet, WalletStatus, WalletTransaction};

struct LedgerState {
  wallet: Wallet,
  outbox: Vec<WalletTransaction>,
}

/// Process-wide fund ledger, shared by `Arc`.
pub struct WalletLedger {
  state: Mutex<LedgerState>,
  journaling: bool,
}

impl WalletLedger {
  /// Create a ledger seeded with `starting_balance`.
  pub fn new(starting_balance: Decimal) -> Result<Self, DomainError> {
    Self::build(starting_balance, false)
  }

  /// Create a ledger that queues every transaction for the journal.
  pub fn with_journaling(starting_balance: Decimal) -> Result<Self, DomainError> {
    Self::build(starting_balance, true)
  }

  fn build(starting_balance: Decimal, journaling: bool) -> Result<Self, DomainError> {
    let wallet = Wallet::new(starting_balance)?;
    let outbox = if journaling {
      wallet.transactions().to_vec()
    } else {
      Vec::new()
    };
    info!(balance = %starting_balance, journaling, "Wallet ledger opened");

    Ok(Self {
      state: Mutex::new(LedgerState { wallet, outbox }),
      journaling,
    })
  }

  /// Run `op` under the lock and queue whatever it appended.
  fn apply<T>(&self, op: impl FnOnce(&mut Wallet) -> T) -> T {
    let mut state = self.state.lock();
    let before = state.wallet.transactions().len();
    let out = op(&mut state.wallet);

    if self.journaling {
      let LedgerState { wallet, outbox } = &mut *state;
      outbox.extend_from_slice(&wallet.transactions()[before..]);
    }
    out
  }

  pub fn try_reserve(&self, amount: Decimal, ticket_id: Uuid) -> bool {
    let ok = self.apply(|w| w.try_reserve(amount, ticket_id));
    if ok {
      debug!(ticket_id = %ticket_id, amount = %amount, "Funds reserved");
    } else {
      debug!(ticket_id = %ticket_id, amount = %amount, "Reserve refused");
    }
    ok
  }

  pub fn try_commit(&self, amount: Decimal, ticket_id: Uuid) -> bool {
    let ok = self.apply(|w| w.try_commit(amount, ticket_id));
    if ok {
      debug!(ticket_id = %ticket_id, amount = %amount, "Funds committed");
    } else {
      warn!(ticket_id = %ticket_id, amount = %amount, "Commit refused: not enough reserved");
    }
    ok
  }

  /// Release up to `amount` back to the balance; returns what moved.
  pub fn release(&self, amount: Decimal, ticket_id: Uuid) -> Decimal {
    let released = self.apply(|w| w.release(amount, ticket_id));
    debug!(ticket_id = %ticket_id, requested = %amount, released = %released, "Funds released");
    released
  }

  pub fn add_payout(&self, amount: Decimal, ticket_id: Uuid) -> Result<(), DomainError> {
    self.apply(|w| w.add_payout(amount, ticket_id))?;
    info!(ticket_id = %ticket_id, amount = %amount, "Payout credited");
    Ok(())
  }

  /// Replace the wallet wholesale. Queued journal entries are kept.
  pub fn reset(&self, starting_balance: Decimal) -> Result<(), DomainError> {
    let wallet = Wallet::new(starting_balance)?;
    let mut state = self.state.lock();
    if self.journaling {
      state.outbox.extend_from_slice(wallet.transactions());
    }
    state.wallet = wallet;
    drop(state);

    warn!(balance = %starting_balance, "Wallet ledger reset");
    Ok(())
  }

  pub fn status(&self) -> WalletStatus {
    self.state.lock().wallet.status()
  }

  /// Copy of the audit log since the last reset.
  pub fn transactions(&self) -> Vec<WalletTransaction> {
    self.state.lock().wallet.transactions().to_vec()
  }

  /// Drain transactions not yet handed to the journal.
  pub fn take_unjournaled(&self) -> Vec<WalletTransaction> {
    std::mem::take(&mut self.state.lock().outbox)
  }

  /// Put entries back at the front of the outbox after a failed append.
  pub fn requeue_unjournaled(&self, mut entries: Vec<WalletTransaction>) {
    if !self.journaling || entries.is_empty() {
      return;
    }
    let mut state = self.state.lock();
    entries.append(&mut state.outbox);
    state.outbox = entries;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TransactionType;
  use rust_decimal_macros::dec;
  use std::sync::Arc;

  #[test]
  fn test_reserve_release_scenario() {
    let ledger = WalletLedger::new(dec!(100)).unwrap();
    let t = Uuid::new_v4();
    assert!(ledger.try_reserve(dec!(50), t));

    let status = ledger.status();
    assert_eq!(status.balance, dec!(50));
    assert_eq!(status.reserved, dec!(50));
    assert_eq!(status.total_funds, dec!(100));

    ledger.release(dec!(50), t);
    let status = ledger.status();
    assert_eq!(status.balance, dec!(100));
    assert_eq!(status.reserved, dec!(0));
  }

  #[test]
  fn test_reset_replaces_state() {
    let ledger = WalletLedger::new(dec!(100)).unwrap();
    assert!(ledger.try_reserve(dec!(40), Uuid::new_v4()));
    ledger.reset(dec!(250)).unwrap();

    let txns = ledger.transactions();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionType::Payout);
    assert_eq!(ledger.status().to_string(), "Balance: 250, Reserved: 0, Total: 250");
    assert!(ledger.reset(dec!(-5)).is_err());
  }

  #[test]
  fn test_outbox_only_when_journaling() {
    let plain = WalletLedger::new(dec!(100)).unwrap();
    assert!(plain.try_reserve(dec!(10), Uuid::new_v4()));
    assert!(plain.take_unjournaled().is_empty());

    let journaled = WalletLedger::with_journaling(dec!(100)).unwrap();
    assert!(journaled.try_reserve(dec!(10), Uuid::new_v4()));
    assert!(!journaled.try_reserve(dec!(1000), Uuid::new_v4()));
    let queued = journaled.take_unjournaled();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[1].kind, TransactionType::Reserve);
    assert!(journaled.take_unjournaled().is_empty());
  }

  #[test]
  fn test_outbox_survives_reset() {
    let ledger = WalletLedger::with_journaling(dec!(100)).unwrap();
    ledger.add_payout(dec!(5), Uuid::new_v4()).unwrap();
    ledger.reset(dec!(100)).unwrap();
    assert_eq!(ledger.take_unjournaled().len(), 3);
  }

  #[test]
  fn test_requeue_keeps_order() {
    let ledger = WalletLedger::with_journaling(dec!(100)).unwrap();
    let first = ledger.take_unjournaled();
    assert!(ledger.try_reserve(dec!(10), Uuid::new_v4()));
    ledger.requeue_unjournaled(first);

    let queued = ledger.take_unjournaled();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].description, "Initial balance");
    assert_eq!(queued[1].kind, TransactionType::Reserve);
  }

  #[test]
  fn test_concurrent_reserves_never_overdraw() {
    let ledger = Arc::new(WalletLedger::new(dec!(100)).unwrap());
    let handles: Vec<_> = (0..16)
      .map(|_| {
        let ledger = Arc::clone(&ledger);
        std::thread::spawn(move || {
          (0..10)
            .filter(|_| ledger.try_reserve(dec!(1), Uuid::new_v4()))
            .count()
        })
      })
      .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 100);
    let status = ledger.status();
    assert_eq!(status.balance, dec!(0));
    assert_eq!(status.reserved, dec!(100));
  }
}
