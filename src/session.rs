//! # Sessions
//!
//! A [`SessionId`] correlates one request with at most one reply. The same raw
//! number has two flavors:
//!
//! - **send-id** (bit 63 clear): carried by the request.
//! - **reply-id** (bit 63 set): carried by the answer.
//!
//! The executor keys suspended continuations by send-id. A reply is
//! recognised by its flavor and mapped back with [`SessionId::to_send`].

use crate::error::{Result, RuntimeError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

const REPLY_FLAG: u64 = 1 << 63;
const MAX_RAW: u64 = REPLY_FLAG - 1;

/// Correlation id for one request/reply exchange.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(u64);

impl SessionId {
    /// "No session". Counts as a send-id, so fire-and-forget traffic is
    /// dispatched as a new request.
    pub const INVALID: SessionId = SessionId(0);

    pub const fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 & MAX_RAW != 0
    }

    pub const fn is_reply(self) -> bool {
        self.0 & REPLY_FLAG != 0
    }

    pub const fn is_send(self) -> bool {
        !self.is_reply()
    }

    pub const fn to_reply(self) -> Self {
        SessionId(self.0 | REPLY_FLAG)
    }

    pub const fn to_send(self) -> Self {
        SessionId(self.0 & MAX_RAW)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reply() {
            write!(f, "{}r", self.to_send().0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Monotonic source of send-ids, shared by every service of a runtime.
#[derive(Debug)]
pub struct SessionAllocator {
    last: AtomicU64,
}

impl SessionAllocator {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Issues the next send-id. Once the id space is used up every further
    /// call fails.
    pub fn alloc(&self) -> Result<SessionId> {
        match self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                (last < MAX_RAW).then_some(last + 1)
            }) {
            Ok(previous) => Ok(SessionId(previous + 1)),
            Err(_) => {
                error!("Session id space exhausted, refusing to allocate");
                Err(RuntimeError::SessionExhausted)
            }
        }
    }
}

impl Default for SessionAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavors_are_distinct_and_invertible() {
        let alloc = SessionAllocator::new();
        let send = alloc.alloc().expect("alloc");
        assert!(send.is_valid());
        assert!(send.is_send());

        let reply = send.to_reply();
        assert!(reply.is_reply());
        assert_ne!(send, reply);
        assert_eq!(reply.to_send(), send);
        assert_eq!(send.to_send(), send);
        assert_eq!(reply.to_reply(), reply);
    }

    #[test]
    fn invalid_session_is_send_flavored() {
        assert!(!SessionId::INVALID.is_valid());
        assert!(SessionId::INVALID.is_send());
        assert!(!SessionId::INVALID.to_reply().is_valid());
    }

    #[test]
    fn ids_increase() {
        let alloc = SessionAllocator::new();
        let a = alloc.alloc().expect("alloc");
        let b = alloc.alloc().expect("alloc");
        assert_eq!(a.as_raw(), 1);
        assert!(b > a);
    }

    #[test]
    fn exhaustion_is_sticky() {
        let alloc = SessionAllocator::starting_after(MAX_RAW - 1);
        let last = alloc.alloc().expect("last id");
        assert_eq!(last.as_raw(), MAX_RAW);
        assert!(last.is_send());

        assert!(matches!(alloc.alloc(), Err(RuntimeError::SessionExhausted)));
        assert!(matches!(alloc.alloc(), Err(RuntimeError::SessionExhausted)));
    }

    #[test]
    fn display_marks_reply_flavor() {
        let id = SessionId::from_raw(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.to_reply().to_string(), "42r");
    }
}
