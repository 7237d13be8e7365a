//! # Teller service
//!
//! Transfers suspend on two ledger calls in a row. If the deposit half fails,
//! the withdrawn amount is put back before the error is returned. Transfers
//! run one at a time, so a refund never lands between another transfer's
//! withdrawal and deposit. Each completed transfer is published as a
//! [`TransferCompleted`] event.

use crate::model::{
    LedgerReply, LedgerRequest, Receipt, Transfer, TransferCompleted, TransferReply,
};
use actor_kernel::{Context, Message, Request, Result, Service, ServiceHandle, ServiceLock};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Teller {
    ledger: ServiceHandle,
    serial: ServiceLock,
}

impl Teller {
    pub fn new(ledger: ServiceHandle) -> Self {
        Self {
            ledger,
            serial: ServiceLock::new(),
        }
    }

    async fn transfer(&self, ctx: &Context, transfer: Transfer) -> Result<TransferReply> {
        let _serial = self.serial.lock(ctx).await?;
        let Transfer { from, to, amount } = transfer;

        let withdrawn: LedgerReply = ctx
            .call(
                &self.ledger,
                LedgerRequest::Withdraw {
                    account: from.clone(),
                    amount,
                },
            )
            .await?;
        let from_balance = match withdrawn {
            Ok(balance) => balance,
            Err(err) => return Ok(Err(err)),
        };

        let deposited: LedgerReply = ctx
            .call(
                &self.ledger,
                LedgerRequest::Deposit {
                    account: to.clone(),
                    amount,
                },
            )
            .await?;
        match deposited {
            Ok(to_balance) => {
                info!(from = %from, to = %to, amount, "Transfer completed");
                ctx.publish(TransferCompleted { from, to, amount });
                Ok(Ok(Receipt {
                    from_balance,
                    to_balance,
                }))
            }
            Err(err) => {
                warn!(from = %from, to = %to, error = %err, "Deposit failed, refunding");
                let _refund: LedgerReply = ctx
                    .call(
                        &self.ledger,
                        LedgerRequest::Deposit {
                            account: from,
                            amount,
                        },
                    )
                    .await?;
                Ok(Err(err))
            }
        }
    }
}

#[async_trait]
impl Service for Teller {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        let transfer: Transfer = req.message.into_typed()?;
        let reply = self.transfer(&ctx, transfer).await?;
        Ok(Some(Message::new(reply)))
    }
}
