//! Messages and errors shared by the bank services.

use actor_kernel::RuntimeError;
use serde::{Deserialize, Serialize};

pub type AccountId = String;

/// Everything the ledger understands. Each request is answered with a
/// `Result<u64, LedgerError>` holding the resulting balance (or total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRequest {
    Open(AccountId),
    Deposit { account: AccountId, amount: u64 },
    Withdraw { account: AccountId, amount: u64 },
    Balance(AccountId),
    Total,
}

pub type LedgerReply = Result<u64, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub from_balance: u64,
    pub to_balance: u64,
}

pub type TransferReply = Result<Receipt, LedgerError>;

/// Published by the teller after money has moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
}

/// Timer message that wakes the auditor.
#[derive(Debug)]
pub struct AuditTick;

/// Request for the auditor's latest findings.
#[derive(Debug)]
pub struct AuditQuery;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub runs: u64,
    pub last_total: u64,
    /// Completed transfers seen since start.
    pub transfers: u64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    UnknownAccount(AccountId),
    #[error("Account already exists: {0}")]
    AccountExists(AccountId),
    #[error("Insufficient funds in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: u64,
        requested: u64,
    },
    #[error("Balance overflow in {0}")]
    Overflow(AccountId),
}

/// Errors surfaced by [`BankClient`](crate::client::BankClient).
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Kernel error: {0}")]
    Kernel(#[from] RuntimeError),
}
