//! # Actor Kernel
//!
//! > **An in-process message-passing kernel for actor-style services.**
//!
//! Services exchange messages through FIFO mailboxes. They are driven by a
//! fixed pool of OS threads, and they suspend their handlers while awaiting
//! correlated replies. No async runtime is needed on the inside. Handlers are
//! plain `async fn`s that the kernel resumes whenever the reply, or the
//! timeout, for the awaited session arrives.
//!
//! ## 🏗️ Core Concepts
//!
//! ### Sessions
//! Every send gets a [`SessionId`]. The reply travels under the *reply
//! flavor* of the same id, and that is how the kernel finds the suspended
//! handler waiting for it. See [`session`].
//!
//! ### Services
//! A [`Service`] implements `on_msg` and, optionally, lifecycle hooks. It
//! moves through `Ready → Starting → Running → Stopping → Stopped → Exited`
//! purely through control messages in its own mailbox. See [`service`].
//!
//! ### Continuations
//! A handler that awaits [`Context::call`] is parked in its service's
//! executor under the awaited session. Every await has a timeout enforced by
//! a hierarchical time wheel. A handler that errors or panics is logged and
//! dropped, and its caller sees a timeout. See [`task`] and [`time`].
//!
//! ### Events
//! Services subscribe to event types with a priority.
//! [`Context::publish`] copies an event to every subscriber, and
//! [`Context::publish_call`] calls them one by one, highest priority first,
//! until the caller has heard enough.
//!
//! ### Workers
//! Shared workers take turns on ready services, one message per turn. A
//! service may instead ask for a dedicated thread
//! ([`ServiceOptions::separate_worker`]).
//!
//! ## 🚀 Quick Start
//!
//! ```no_run
//! use actor_kernel::{Context, Message, Request, Result, Runtime, RuntimeConfig, Service};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Doubler;
//!
//! #[async_trait]
//! impl Service for Doubler {
//!     async fn on_msg(self: Arc<Self>, _ctx: Context, req: Request) -> Result<Option<Message>> {
//!         let n: u64 = req.message.into_typed()?;
//!         Ok(Some(Message::new(n * 2)))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runtime = Runtime::new(RuntimeConfig::default())?;
//!     let doubler = runtime.new_service(Doubler)?;
//!     let port = runtime.port()?;
//!     let doubled: u64 = port.call(&doubler, 21_u64).await?;
//!     assert_eq!(doubled, 42);
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## 🗺️ Module Tour
//!
//! - [`runtime`]: [`Runtime`], [`Port`], logging setup
//! - [`service`]: the [`Service`] trait, [`Context`], handles and lifecycle,
//!   [`MsgRouter`] and [`ServiceLock`]
//! - [`task`]: continuations, [`Recv`], the per-service executor
//! - [`time`]: the time wheel, session timeouts, delayed delivery
//! - [`mock`]: [`Probe`](mock::Probe), a recording service for tests

pub mod config;
pub mod error;
pub mod id;
pub mod message;
pub mod mock;
pub mod runtime;
pub mod service;
pub mod session;
pub mod task;
pub mod time;

pub use config::{ClockMode, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use id::ServiceId;
pub use message::{Message, WireMessage};
pub use runtime::{Port, Runtime};
pub use service::{
    Context, MsgRouter, Request, Service, ServiceHandle, ServiceLock, ServiceOptions, ServiceStage,
};
pub use session::{SessionAllocator, SessionId};
pub use task::{Recv, RecvOrNone};
pub use time::{AwaitTimeout, TimeWheel, MAX_DELAY};
