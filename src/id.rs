//! Service ids.
//!
//! Snowflake layout: `0 | node (10 bits) | timestamp + sequence (53 bits)`.
//! The low 53 bits start at `(now_ms - EPOCH_MS) << 12` and count up. Ids
//! therefore stay unique across restarts as long as fewer than 4096 ids are
//! minted per millisecond on average.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MIXED_BITS: u32 = 63 - NODE_BITS;
const MIXED_MASK: u64 = (1 << MIXED_BITS) - 1;
pub(crate) const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;

/// 2020-05-03T00:00:00Z
const EPOCH_MS: u64 = 1_588_464_000_000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(u64);

impl ServiceId {
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn node(self) -> u16 {
        (self.0 >> MIXED_BITS) as u16
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({self})")
    }
}

#[derive(Debug)]
pub(crate) struct ServiceIdGenerator {
    node: u64,
    mixed: AtomicU64,
}

impl ServiceIdGenerator {
    pub(crate) fn new(node: u16) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(EPOCH_MS);
        let seed = (now_ms.saturating_sub(EPOCH_MS) << SEQUENCE_BITS) & MIXED_MASK;
        Self {
            node: u64::from(node.min(MAX_NODE_ID)) << MIXED_BITS,
            mixed: AtomicU64::new(seed),
        }
    }

    pub(crate) fn next(&self) -> ServiceId {
        let mixed = self.mixed.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & MIXED_MASK;
        ServiceId(self.node | mixed)
    }
}
