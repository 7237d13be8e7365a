//! Continuations and the per-service executor that resumes them.
//!
//! A handler invocation becomes a boxed future. The executor polls it once
//! when the message arrives. If it suspends on a [`Recv`], the executor files
//! it under the awaited session and polls it again when the reply or the
//! timeout for that session comes in. Nothing here uses wakers. Resumption
//! is driven entirely by mailbox traffic.

mod continuation;
mod executor;
mod recv;

pub(crate) use continuation::{AwaitSlot, Continuation, TaskKind};
pub(crate) use executor::{Finished, Schedule, SessionWatch, TaskExecutor};
pub use recv::{Recv, RecvOrNone};
