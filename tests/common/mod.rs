#![allow(dead_code)]

use actor_kernel::{
    ClockMode, Context, Message, Request, Result, Runtime, RuntimeConfig, Service, ServiceHandle,
    SessionId,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Runtime whose wheels only move when the test calls `advance`.
pub fn manual_runtime() -> Runtime {
    Runtime::new(
        RuntimeConfig::default()
            .with_workers(2)
            .with_clock(ClockMode::Manual)
            .with_shutdown_grace_ms(200),
    )
    .expect("Failed to start runtime")
}

/// Runtime with a fast real clock (5 ms ticks).
pub fn realtime_runtime() -> Runtime {
    Runtime::new(
        RuntimeConfig::default()
            .with_workers(2)
            .with_tick_ms(5)
            .with_shutdown_grace_ms(200),
    )
    .expect("Failed to start runtime")
}

/// Polls `check` for up to five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Instruction for [`Replier`]: answer `session` on behalf of whoever was asked.
#[derive(Debug)]
pub struct ReplyTo<T> {
    pub to: ServiceHandle,
    pub session: SessionId,
    pub value: T,
}

/// Sends replies for requests that landed on a probe.
pub struct Replier;

#[async_trait]
impl Service for Replier {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        let ReplyTo { to, session, value } = req.message.into_typed::<ReplyTo<u32>>()?;
        ctx.reply(&to, session, value);
        Ok(None)
    }
}
