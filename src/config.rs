//! Runtime configuration.
//!
//! The kernel does not read files itself. Embedders deserialize a
//! [`RuntimeConfig`] from whatever format they use. Missing fields take their
//! defaults.
//!
//! ```
//! use actor_kernel::{ClockMode, RuntimeConfig};
//!
//! let config = RuntimeConfig::default().with_workers(2).with_clock(ClockMode::Manual);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Result, RuntimeError};
use crate::id::MAX_NODE_ID;
use crate::time::MAX_DELAY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How time advances for the session monitor and the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Background threads advance the wheels every `tick_ms`.
    #[default]
    Realtime,
    /// Nothing advances until [`Runtime::advance`](crate::Runtime::advance) is called.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Shared worker threads. `0` means one per available core.
    pub worker_threads: usize,
    /// Wall-clock length of one wheel tick.
    pub tick_ms: u64,
    /// Timeout applied to awaits that do not pick their own.
    pub session_timeout_ticks: u32,
    pub clock: ClockMode,
    /// Node component of minted service ids, below 1024.
    pub node_id: u16,
    /// How long shutdown waits for services to finish `on_stop`.
    pub shutdown_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            tick_ms: 10,
            session_timeout_ticks: 500,
            clock: ClockMode::Realtime,
            node_id: 0,
            shutdown_grace_ms: 1_000,
        }
    }
}

impl RuntimeConfig {
    pub fn with_workers(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_session_timeout(mut self, ticks: u32) -> Self {
        self.session_timeout_ticks = ticks;
        self
    }

    pub fn with_node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, millis: u64) -> Self {
        self.shutdown_grace_ms = millis;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(RuntimeError::Config("tick_ms must be positive".into()));
        }
        if u64::from(self.session_timeout_ticks) > MAX_DELAY {
            return Err(RuntimeError::Config(format!(
                "session_timeout_ticks {} exceeds {}",
                self.session_timeout_ticks, MAX_DELAY
            )));
        }
        if self.node_id > MAX_NODE_ID {
            return Err(RuntimeError::Config(format!(
                "node_id {} exceeds {}",
                self.node_id, MAX_NODE_ID
            )));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
