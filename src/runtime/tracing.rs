//! # Logging
//!
//! The kernel logs through `tracing` with structured fields:
//!
//! - `service`: the [`ServiceId`](crate::ServiceId) in hex
//! - `kind`: the service type's short name, e.g. `Ledger`
//! - `session`: a session id, with an `r` suffix for the reply flavor
//! - `error`: the rendered [`RuntimeError`](crate::RuntimeError)
//!
//! Levels:
//!
//! - `info`: lifecycle (created, started, stopped, exited, destroyed)
//! - `warn`: timeouts and failed lifecycle handlers
//! - `error`: failed continuations and fatal id or delay errors
//! - `debug`: dropped traffic
//! - `trace`: per-message worker turns
//!
//! ```bash
//! RUST_LOG=info cargo run -p kernel-sample
//! RUST_LOG=actor_kernel=debug cargo test
//! ```

use tracing_subscriber::EnvFilter;

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already set. Use
/// [`try_setup_tracing`] from tests.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but a second call is a no-op.
pub fn try_setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
