//! # Ledger service
//!
//! Keeps balances in memory. Every [`LedgerRequest`] is answered with the
//! balance it produced, or a [`LedgerError`].

use crate::model::{AccountId, LedgerError, LedgerReply, LedgerRequest};
use actor_kernel::{Context, Message, Request, Result, Service};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct Ledger {
    accounts: Mutex<HashMap<AccountId, u64>>,
}

impl Ledger {
    fn apply(&self, request: LedgerRequest) -> LedgerReply {
        let mut accounts = self.accounts.lock();
        match request {
            LedgerRequest::Open(account) => {
                if accounts.contains_key(&account) {
                    return Err(LedgerError::AccountExists(account));
                }
                info!(account = %account, "Account opened");
                accounts.insert(account, 0);
                Ok(0)
            }
            LedgerRequest::Deposit { account, amount } => {
                let balance = accounts
                    .get_mut(&account)
                    .ok_or_else(|| LedgerError::UnknownAccount(account.clone()))?;
                *balance = balance
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
                debug!(account = %account, amount, balance = *balance, "Deposit");
                Ok(*balance)
            }
            LedgerRequest::Withdraw { account, amount } => {
                let balance = accounts
                    .get_mut(&account)
                    .ok_or_else(|| LedgerError::UnknownAccount(account.clone()))?;
                if *balance < amount {
                    warn!(account = %account, balance = *balance, amount, "Withdrawal refused");
                    return Err(LedgerError::InsufficientFunds {
                        account,
                        balance: *balance,
                        requested: amount,
                    });
                }
                *balance -= amount;
                debug!(account = %account, amount, balance = *balance, "Withdrawal");
                Ok(*balance)
            }
            LedgerRequest::Balance(account) => accounts
                .get(&account)
                .copied()
                .ok_or(LedgerError::UnknownAccount(account)),
            LedgerRequest::Total => Ok(accounts.values().sum()),
        }
    }
}

#[async_trait]
impl Service for Ledger {
    async fn on_msg(self: Arc<Self>, _ctx: Context, req: Request) -> Result<Option<Message>> {
        let request: LedgerRequest = req.message.into_typed()?;
        Ok(Some(Message::new(self.apply(request))))
    }

    fn on_exit(&self, _ctx: &Context) {
        let accounts = self.accounts.lock();
        info!(
            accounts = accounts.len(),
            total = accounts.values().sum::<u64>(),
            "Ledger closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(ledger: &Ledger, account: &str, amount: u64) {
        ledger
            .apply(LedgerRequest::Open(account.into()))
            .expect("Failed to open");
        ledger
            .apply(LedgerRequest::Deposit {
                account: account.into(),
                amount,
            })
            .expect("Failed to deposit");
    }

    #[test]
    fn withdraw_refuses_overdraft() {
        let ledger = Ledger::default();
        open(&ledger, "alice", 10);

        let err = ledger
            .apply(LedgerRequest::Withdraw {
                account: "alice".into(),
                amount: 11,
            })
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: "alice".into(),
                balance: 10,
                requested: 11,
            }
        );
        assert_eq!(ledger.apply(LedgerRequest::Balance("alice".into())), Ok(10));
    }

    #[test]
    fn accounts_are_opened_once() {
        let ledger = Ledger::default();
        open(&ledger, "bob", 0);
        assert_eq!(
            ledger.apply(LedgerRequest::Open("bob".into())),
            Err(LedgerError::AccountExists("bob".into()))
        );
        assert_eq!(
            ledger.apply(LedgerRequest::Balance("carol".into())),
            Err(LedgerError::UnknownAccount("carol".into()))
        );
    }

    #[test]
    fn total_sums_every_account() {
        let ledger = Ledger::default();
        open(&ledger, "a", 5);
        open(&ledger, "b", 7);
        assert_eq!(ledger.apply(LedgerRequest::Total), Ok(12));
    }
}
