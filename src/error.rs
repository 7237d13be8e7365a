//! # Kernel Errors
//!
//! One error type for the whole kernel. Errors split into four families:
//!
//! - **Fatal**: [`RuntimeError::SessionExhausted`] and [`RuntimeError::DelayOutOfRange`].
//!   They are logged at `error!` and surfaced to the caller, never panicked.
//! - **Service-fatal**: a failing `on_init` yields [`RuntimeError::InitFailed`].
//!   A failing `on_start`/`on_stop` stops and exits the service.
//! - **Recoverable**: whatever a message handler returns or panics with. It is
//!   logged at the executor boundary and the continuation is dropped.
//! - **Protocol**: out-of-stage control messages. These never produce an error
//!   value at all; they are dropped.

use crate::session::SessionId;

/// Errors produced by the kernel or carried out of a service handler.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Session id space exhausted")]
    SessionExhausted,
    #[error("Invalid session")]
    InvalidSession,
    #[error("Delay of {0} ticks exceeds the time wheel range")]
    DelayOutOfRange(u64),
    #[error("Session {0} timed out")]
    SessionTimeout(SessionId),
    #[error("Session {0} is already awaited by another continuation")]
    SessionAlreadyAwaited(SessionId),
    #[error("Continuation already awaits session {0}")]
    AwaitConflict(SessionId),
    #[error("Continuation suspended without awaiting a session")]
    ForeignSuspend,
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Service name already registered: {0}")]
    NameTaken(String),
    #[error("Service init failed: {0}")]
    InitFailed(String),
    #[error("Continuation panicked: {0}")]
    Panicked(String),
    #[error("Port dropped the reply channel")]
    PortClosed,
    #[error("Runtime is shut down")]
    Shutdown,
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl RuntimeError {
    /// Wraps an arbitrary handler error.
    ///
    /// ```
    /// use actor_kernel::RuntimeError;
    ///
    /// let err = RuntimeError::handler("balance would go negative");
    /// assert_eq!(err.to_string(), "Handler error: balance would go negative");
    /// ```
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RuntimeError::Handler(err.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RuntimeError::SessionTimeout(_))
    }

    /// Renders a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        RuntimeError::Panicked(text)
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
