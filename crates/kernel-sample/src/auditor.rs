//! # Auditor service
//!
//! Schedules an [`AuditTick`] for itself every `every` ticks. On each tick it
//! asks the ledger for the total and records it. It also counts every
//! [`TransferCompleted`] event. [`AuditQuery`] returns the report so far.

use crate::model::{
    AuditQuery, AuditReport, AuditTick, LedgerReply, LedgerRequest, TransferCompleted,
};
use actor_kernel::{Context, Message, MsgRouter, Request, Result, Service, ServiceHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Auditor {
    ledger: ServiceHandle,
    every: u64,
    report: Mutex<AuditReport>,
    router: MsgRouter<Auditor>,
}

impl Auditor {
    pub fn new(ledger: ServiceHandle, every: u64) -> Self {
        Self {
            ledger,
            every,
            report: Mutex::new(AuditReport::default()),
            router: MsgRouter::new()
                .on(Auditor::query)
                .on(Auditor::tick)
                .on(Auditor::transfer_completed),
        }
    }

    async fn query(self: Arc<Self>, _ctx: Context, _req: Request<AuditQuery>) -> Result<Option<Message>> {
        Ok(Some(Message::new(*self.report.lock())))
    }

    async fn transfer_completed(
        self: Arc<Self>,
        _ctx: Context,
        req: Request<TransferCompleted>,
    ) -> Result<Option<Message>> {
        let mut report = self.report.lock();
        report.transfers += 1;
        report.volume += req.message.amount;
        Ok(None)
    }

    async fn tick(self: Arc<Self>, ctx: Context, _req: Request<AuditTick>) -> Result<Option<Message>> {
        // Schedule the next round first so a failed audit does not end the cycle.
        ctx.timeout(self.every, AuditTick)?;
        self.audit(&ctx).await?;
        Ok(None)
    }

    async fn audit(&self, ctx: &Context) -> Result<()> {
        let total: LedgerReply = ctx.call(&self.ledger, LedgerRequest::Total).await?;
        match total {
            Ok(total) => {
                let mut report = self.report.lock();
                report.runs += 1;
                report.last_total = total;
                info!(run = report.runs, total, "Audit finished");
            }
            Err(err) => warn!(error = %err, "Audit failed"),
        }
        Ok(())
    }
}

#[async_trait]
impl Service for Auditor {
    fn on_init(&self, ctx: &Context) -> Result<()> {
        ctx.subscribe::<TransferCompleted>(0);
        Ok(())
    }

    async fn on_start(
        self: Arc<Self>,
        ctx: Context,
        _req: Request<Option<Message>>,
    ) -> Result<Option<Message>> {
        ctx.timeout(self.every, AuditTick)?;
        Ok(None)
    }

    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        self.router.dispatch(self.clone(), ctx, req).await
    }
}
