//! # Session Monitor
//!
//! Every suspended await registers here. When its deadline passes, the kernel
//! posts a `SessionTimeout` control message to the owning service. A timeout
//! for a session that was answered in the meantime finds no continuation and
//! is dropped by the executor.

use super::driver::TickClock;
use super::wheel::TimeWheel;
use crate::error::Result;
use crate::service::ServiceHandle;
use crate::session::SessionId;

/// How long an await may stay suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwaitTimeout {
    /// The runtime's `session_timeout_ticks`.
    #[default]
    Default,
    Ticks(u32),
    /// Stay suspended until answered or until the service exits.
    Never,
}

pub(crate) struct SessionMonitor {
    wheel: TimeWheel<(ServiceHandle, SessionId)>,
    default_ticks: u32,
    clock: Option<TickClock>,
}

impl SessionMonitor {
    pub(crate) fn new(default_ticks: u32, clock: Option<TickClock>) -> Self {
        Self {
            wheel: TimeWheel::new(),
            default_ticks,
            clock,
        }
    }

    pub(crate) fn watch(
        &self,
        service: &ServiceHandle,
        session: SessionId,
        timeout: AwaitTimeout,
    ) -> Result<()> {
        let ticks = match timeout {
            AwaitTimeout::Never => return Ok(()),
            AwaitTimeout::Default => self.default_ticks,
            AwaitTimeout::Ticks(ticks) => ticks,
        };
        let entry = (service.clone(), session);
        match self.clock {
            Some(clock) => self.wheel.add_at(clock.now(), u64::from(ticks), entry),
            None => self.wheel.add(u64::from(ticks), entry),
        }
    }

    pub(crate) fn expire(&self, elapsed: u64) -> Vec<(ServiceHandle, SessionId)> {
        self.wheel.tick(elapsed)
    }

    pub(crate) fn pending(&self) -> usize {
        self.wheel.len()
    }
}
