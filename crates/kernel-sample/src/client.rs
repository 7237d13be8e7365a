//! Typed front door to the bank services.

use crate::model::{
    AccountId, AuditQuery, AuditReport, BankError, LedgerReply, LedgerRequest, Receipt, Transfer,
    TransferReply,
};
use actor_kernel::{Port, ServiceHandle};

#[derive(Clone)]
pub struct BankClient {
    port: Port,
    ledger: ServiceHandle,
    teller: ServiceHandle,
    auditor: ServiceHandle,
}

impl BankClient {
    pub fn new(port: Port, ledger: ServiceHandle, teller: ServiceHandle, auditor: ServiceHandle) -> Self {
        Self {
            port,
            ledger,
            teller,
            auditor,
        }
    }

    async fn ledger(&self, request: LedgerRequest) -> Result<u64, BankError> {
        let reply: LedgerReply = self.port.call(&self.ledger, request).await?;
        Ok(reply?)
    }

    pub async fn open(&self, account: impl Into<AccountId>) -> Result<(), BankError> {
        self.ledger(LedgerRequest::Open(account.into())).await?;
        Ok(())
    }

    pub async fn deposit(&self, account: impl Into<AccountId>, amount: u64) -> Result<u64, BankError> {
        self.ledger(LedgerRequest::Deposit {
            account: account.into(),
            amount,
        })
        .await
    }

    pub async fn withdraw(&self, account: impl Into<AccountId>, amount: u64) -> Result<u64, BankError> {
        self.ledger(LedgerRequest::Withdraw {
            account: account.into(),
            amount,
        })
        .await
    }

    pub async fn balance(&self, account: impl Into<AccountId>) -> Result<u64, BankError> {
        self.ledger(LedgerRequest::Balance(account.into())).await
    }

    pub async fn transfer(
        &self,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: u64,
    ) -> Result<Receipt, BankError> {
        let transfer = Transfer {
            from: from.into(),
            to: to.into(),
            amount,
        };
        let reply: TransferReply = self.port.call(&self.teller, transfer).await?;
        Ok(reply?)
    }

    pub async fn audit_report(&self) -> Result<AuditReport, BankError> {
        Ok(self.port.call(&self.auditor, AuditQuery).await?)
    }
}
