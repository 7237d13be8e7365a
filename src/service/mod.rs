//! # Services
//!
//! A service is the unit of isolation. It has a FIFO mailbox, a lifecycle
//! stage, and its own table of suspended continuations. At most one worker
//! touches a service at a time, so handlers never race with themselves.
//!
//! ## Lifecycle
//!
//! ```text
//! Ready -> Starting -> Running -> Stopping -> Stopped -> Exited
//! ```
//!
//! Every transition is driven by a control message sent through the service's
//! own mailbox. A control message that arrives in the wrong stage is dropped,
//! so `Start` twice is the same as `Start` once.
//!
//! ## Writing a service
//!
//! Handlers receive `self: Arc<Self>` and an owned [`Context`], so they can
//! suspend on [`Context::call`] without borrowing anything from the kernel.
//! Mutable state goes behind interior mutability. Returning `Ok(Some(msg))`
//! replies to the request's sender.
//!
//! A service with several message types can hand `on_msg` to a
//! [`MsgRouter`], which picks the handler by payload type. Handlers that
//! must not interleave across awaits take a [`ServiceLock`].
//!
//! ```
//! use actor_kernel::{Context, Message, Request, Result, Service};
//! use async_trait::async_trait;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Counter {
//!     total: AtomicU64,
//! }
//!
//! #[async_trait]
//! impl Service for Counter {
//!     async fn on_msg(self: Arc<Self>, _ctx: Context, req: Request) -> Result<Option<Message>> {
//!         let add: u64 = req.message.into_typed()?;
//!         let total = self.total.fetch_add(add, Ordering::Relaxed) + add;
//!         Ok(Some(Message::new(total)))
//!     }
//! }
//! ```

mod context;
mod lock;
mod router;
pub(crate) mod service_core;

pub use context::Context;
pub use lock::{ServiceLock, ServiceLockGuard};
pub use router::MsgRouter;

use crate::error::Result;
use crate::id::ServiceId;
use crate::message::Message;
use crate::session::SessionId;
use async_trait::async_trait;
use self::service_core::ServiceCore;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Lifecycle stage of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServiceStage {
    Ready = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Exited = 5,
}

impl ServiceStage {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ServiceStage::Ready,
            1 => ServiceStage::Starting,
            2 => ServiceStage::Running,
            3 => ServiceStage::Stopping,
            4 => ServiceStage::Stopped,
            _ => ServiceStage::Exited,
        }
    }
}

/// An inbound request or lifecycle signal.
///
/// `on_msg` gets a `Request<Message>`. `on_start` and `on_stop` get the
/// optional payload the starter or stopper attached.
#[derive(Debug)]
pub struct Request<M = Message> {
    pub sender: Option<ServiceHandle>,
    pub session: SessionId,
    pub message: M,
}

/// Behaviour of a service. Only `on_msg` is required.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Runs synchronously inside `new_service`. An error aborts creation and
    /// the service is never registered.
    fn on_init(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn on_start(
        self: Arc<Self>,
        _ctx: Context,
        _req: Request<Option<Message>>,
    ) -> Result<Option<Message>> {
        Ok(None)
    }

    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>>;

    async fn on_stop(
        self: Arc<Self>,
        _ctx: Context,
        _req: Request<Option<Message>>,
    ) -> Result<Option<Message>> {
        Ok(None)
    }

    /// Last call before the service is torn down. Suspended continuations
    /// are dropped right after it returns.
    fn on_exit(&self, _ctx: &Context) {}
}

/// Creation options for [`Runtime::spawn`](crate::Runtime::spawn) and [`Context::spawn`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub name: Option<String>,
    pub separate_worker: bool,
    pub auto_start: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            name: None,
            separate_worker: false,
            auto_start: true,
        }
    }
}

impl ServiceOptions {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Give the service its own OS thread instead of the shared pool.
    pub fn separate_worker(mut self) -> Self {
        self.separate_worker = true;
        self
    }

    /// Leave the service in `Ready` until it is started explicitly.
    pub fn manual_start(mut self) -> Self {
        self.auto_start = false;
        self
    }
}

/// Weak, cloneable address of a service.
///
/// Sending to a handle whose service is gone does nothing.
#[derive(Clone)]
pub struct ServiceHandle {
    id: ServiceId,
    core: Weak<ServiceCore>,
}

impl ServiceHandle {
    pub(crate) fn new(id: ServiceId, core: Weak<ServiceCore>) -> Self {
        Self { id, core }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// `None` once the service has been destroyed.
    pub fn stage(&self) -> Option<ServiceStage> {
        self.core.upgrade().map(|core| core.stage())
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.stage(), Some(stage) if stage != ServiceStage::Exited)
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<ServiceCore>> {
        self.core.upgrade()
    }
}

impl PartialEq for ServiceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceHandle {}

impl Hash for ServiceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceHandle({})", self.id)
    }
}
