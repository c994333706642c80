//! Fund ledger state machine.
//!
//! Money sits either in `balance` (spendable) or `reserved` (held for a
//! ticket being placed). Reserve and release move money between the two,
//! commit retires reserved money as a placed stake, and payout credits
//! the balance. Each successful operation appends one transaction that
//! captures the post-operation state. The log is append-only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Reserve,
    Commit,
    Release,
    Payout,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reserve => write!(f, "Reserve"),
            Self::Commit => write!(f, "Commit"),
            Self::Release => write!(f, "Release"),
            Self::Payout => write!(f, "Payout"),
        }
    }
}

/// One audit-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    /// Nil for the initial seed.
    pub ticket_id: Uuid,
    pub kind: TransactionType,
    pub amount: Decimal,
    /// Available balance after this transaction.
    pub balance_after: Decimal,
    /// Reserved amount after this transaction.
    pub reserved_after: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for WalletTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {} | {} | Balance: {} | Reserved: {}",
            self.created_at.format("%H:%M:%S"),
            self.kind,
            self.amount,
            self.description,
            self.balance_after,
            self.reserved_after
        )
    }
}

/// Point-in-time view of the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStatus {
    pub balance: Decimal,
    pub reserved: Decimal,
    pub total_funds: Decimal,
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Balance: {}, Reserved: {}, Total: {}",
            self.balance, self.reserved, self.total_funds
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    balance: Decimal,
    reserved: Decimal,
    transactions: Vec<WalletTransaction>,
}

impl Wallet {
    /// Open a wallet seeded with `starting_balance` via one Payout entry.
    pub fn new(starting_balance: Decimal) -> Result<Self, DomainError> {
        if starting_balance < Decimal::ZERO {
            return Err(DomainError::InvalidArgument(format!(
                "starting balance cannot be negative, got {starting_balance}"
            )));
        }

        let mut wallet = Self {
            balance: starting_balance,
            reserved: Decimal::ZERO,
            transactions: Vec::new(),
        };
        wallet.record(
            TransactionType::Payout,
            starting_balance,
            "Initial balance".to_string(),
            Uuid::nil(),
        );
        Ok(wallet)
    }

    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    pub const fn reserved(&self) -> Decimal {
        self.reserved
    }

    pub fn total_funds(&self) -> Decimal {
        self.balance + self.reserved
    }

    pub fn status(&self) -> WalletStatus {
        WalletStatus {
            balance: self.balance,
            reserved: self.reserved,
            total_funds: self.total_funds(),
        }
    }

    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    pub fn has_sufficient_balance(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Move `amount` from balance to reserved.
    pub fn try_reserve(&mut self, amount: Decimal, ticket_id: Uuid) -> bool {
        if amount <= Decimal::ZERO || !self.has_sufficient_balance(amount) {
            return false;
        }

        self.balance -= amount;
        self.reserved += amount;
        self.record(
            TransactionType::Reserve,
            amount,
            format!("Reserved funds for ticket {ticket_id}"),
            ticket_id,
        );
        true
    }

    /// Retire `amount` of reserved funds as a placed stake.
    pub fn try_commit(&mut self, amount: Decimal, ticket_id: Uuid) -> bool {
        if amount <= Decimal::ZERO || self.reserved < amount {
            return false;
        }

        self.reserved -= amount;
        self.record(
            TransactionType::Commit,
            amount,
            format!("Committed funds for ticket {ticket_id}"),
            ticket_id,
        );
        true
    }

    /// Return up to `amount` of reserved funds to the balance.
    ///
    /// The amount is clamped to what is reserved; returns what moved.
    pub fn release(&mut self, amount: Decimal, ticket_id: Uuid) -> Decimal {
        let released = amount.max(Decimal::ZERO).min(self.reserved);

        self.reserved -= released;
        self.balance += released;
        self.record(
            TransactionType::Release,
            released,
            format!("Released funds for ticket {ticket_id}"),
            ticket_id,
        );
        released
    }

    pub fn add_payout(&mut self, amount: Decimal, ticket_id: Uuid) -> Result<(), DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::InvalidArgument(format!(
                "payout cannot be negative, got {amount}"
            )));
        }

        self.balance += amount;
        self.record(
            TransactionType::Payout,
            amount,
            format!("Payout for ticket {ticket_id}"),
            ticket_id,
        );
        Ok(())
    }

    fn record(&mut self, kind: TransactionType, amount: Decimal, description: String, ticket_id: Uuid) {
        self.transactions.push(WalletTransaction {
            id: Uuid::new_v4(),
            ticket_id,
            kind,
            amount,
            balance_after: self.balance,
            reserved_after: self.reserved,
            description,
            created_at: Utc::now(),
        });
    }
}
