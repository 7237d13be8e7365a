//! # Service lock
//!
//! A handler that awaits gives its worker back, so another handler of the
//! same service may start and interleave with it at every await point.
//! [`ServiceLock`] serializes such handlers: the second one to call
//! [`ServiceLock::lock`] suspends until the first drops its guard.
//!
//! Waiting is an ordinary await. The waiter takes a fresh session and awaits
//! it. Releasing the lock replies to that session from the service to itself,
//! so the handoff travels through the mailbox like any other reply. Waiters
//! are served first come, first served, and ownership passes directly to the
//! next waiter without the lock ever being observed free in between.

use super::Context;
use crate::error::Result;
use crate::session::SessionId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// Reply that hands the lock to a waiter.
#[derive(Debug)]
struct LockHandoff;

#[derive(Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<SessionId>,
}

/// Mutual exclusion between handlers of one service.
///
/// Hold it as a field of the service. The lock only sequences handlers of the
/// service it belongs to; it is never shared between services.
#[derive(Default)]
pub struct ServiceLock {
    state: Mutex<LockState>,
}

impl ServiceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock, suspending until it is handed over if another handler
    /// holds it. The wait has no timeout.
    pub async fn lock(&self, ctx: &Context) -> Result<ServiceLockGuard<'_>> {
        let session = {
            let mut state = self.state.lock();
            if !state.locked {
                state.locked = true;
                return Ok(ServiceLockGuard {
                    lock: self,
                    ctx: ctx.clone(),
                });
            }
            let session = ctx.new_session();
            state.waiters.push_back(session);
            session
        };
        debug!(service = %ctx.id(), session = %session, "Waiting for service lock");
        if let Err(err) = ctx.recv::<LockHandoff>(session).never_timeout().await {
            self.abandon(ctx, session);
            return Err(err);
        }
        Ok(ServiceLockGuard {
            lock: self,
            ctx: ctx.clone(),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Handlers suspended in [`lock`](Self::lock).
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Passes the lock to the oldest waiter, or frees it.
    fn release(&self, ctx: &Context) {
        let next = {
            let mut state = self.state.lock();
            match state.waiters.pop_front() {
                Some(next) => Some(next),
                None => {
                    state.locked = false;
                    None
                }
            }
        };
        if let Some(next) = next {
            ctx.reply(ctx.handle(), next, LockHandoff);
        }
    }

    /// A waiter that gave up either was still queued, or already owns the
    /// lock through a handoff it never consumed.
    fn abandon(&self, ctx: &Context, session: SessionId) {
        let queued = {
            let mut state = self.state.lock();
            match state.waiters.iter().position(|waiter| *waiter == session) {
                Some(position) => {
                    state.waiters.remove(position);
                    true
                }
                None => false,
            }
        };
        if !queued {
            self.release(ctx);
        }
    }
}

/// Releases the [`ServiceLock`] when dropped.
pub struct ServiceLockGuard<'a> {
    lock: &'a ServiceLock,
    ctx: Context,
}

impl Drop for ServiceLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.ctx);
    }
}
