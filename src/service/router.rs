//! # Typed message routing
//!
//! [`MsgRouter`] maps the payload type of an incoming request to a handler
//! that takes the decoded value, so `on_msg` does not have to inspect and
//! downcast by hand. A service builds its router once and delegates to it:
//!
//! ```
//! use actor_kernel::service::MsgRouter;
//! use actor_kernel::{Context, Message, Request, Result, Service};
//! use async_trait::async_trait;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! struct Add(u64);
//! struct Reset;
//!
//! struct Counter {
//!     total: AtomicU64,
//!     router: MsgRouter<Counter>,
//! }
//!
//! impl Counter {
//!     fn new() -> Self {
//!         Self {
//!             total: AtomicU64::new(0),
//!             router: MsgRouter::new().on(Counter::add).on(Counter::reset),
//!         }
//!     }
//!
//!     async fn add(self: Arc<Self>, _ctx: Context, req: Request<Add>) -> Result<Option<Message>> {
//!         let total = self.total.fetch_add(req.message.0, Ordering::Relaxed) + req.message.0;
//!         Ok(Some(Message::new(total)))
//!     }
//!
//!     async fn reset(self: Arc<Self>, _ctx: Context, _req: Request<Reset>) -> Result<Option<Message>> {
//!         self.total.store(0, Ordering::Relaxed);
//!         Ok(None)
//!     }
//! }
//!
//! #[async_trait]
//! impl Service for Counter {
//!     async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
//!         self.router.dispatch(self.clone(), ctx, req).await
//!     }
//! }
//! ```

use super::{Context, Request};
use crate::error::Result;
use crate::message::{short_type_name, Message};
use futures::future::{self, BoxFuture, FutureExt};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type Handler<S> =
    Box<dyn Fn(Arc<S>, Context, Request) -> BoxFuture<'static, Result<Option<Message>>> + Send + Sync>;

/// Per-type handler table for a service of type `S`.
pub struct MsgRouter<S> {
    handlers: HashMap<TypeId, (&'static str, Handler<S>)>,
    fallback: Option<Handler<S>>,
}

impl<S: Send + Sync + 'static> MsgRouter<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Routes payloads of type `M` to `handler`. Registering `M` again
    /// replaces the earlier handler.
    pub fn on<M, F, Fut>(mut self, handler: F) -> Self
    where
        M: Any + Send,
        F: Fn(Arc<S>, Context, Request<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Message>>> + Send + 'static,
    {
        let erased: Handler<S> = Box::new(move |service: Arc<S>, ctx: Context, req: Request| {
            let Request {
                sender,
                session,
                message,
            } = req;
            match message.into_typed::<M>() {
                Ok(message) => handler(
                    service,
                    ctx,
                    Request {
                        sender,
                        session,
                        message,
                    },
                )
                .boxed(),
                Err(err) => future::ready(Err(err)).boxed(),
            }
        });
        self.handlers.insert(TypeId::of::<M>(), (type_name::<M>(), erased));
        self
    }

    /// Handles every payload type without a registered handler. Without a
    /// fallback such messages are logged and dropped.
    pub fn fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<S>, Context, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Message>>> + Send + 'static,
    {
        let erased: Handler<S> =
            Box::new(move |service: Arc<S>, ctx: Context, req: Request| handler(service, ctx, req).boxed());
        self.fallback = Some(erased);
        self
    }

    pub fn handles<M: Any>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for the request's payload type.
    pub fn dispatch(
        &self,
        service: Arc<S>,
        ctx: Context,
        req: Request,
    ) -> BoxFuture<'static, Result<Option<Message>>> {
        if let Some((_, handler)) = self.handlers.get(&req.message.payload_type_id()) {
            return handler(service, ctx, req);
        }
        match &self.fallback {
            Some(fallback) => fallback(service, ctx, req),
            None => {
                debug!(
                    service = %ctx.id(),
                    kind = short_type_name(req.message.type_name()),
                    "No handler for message"
                );
                future::ready(Ok(None)).boxed()
            }
        }
    }
}

impl<S: Send + Sync + 'static> Default for MsgRouter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for MsgRouter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.values().map(|(name, _)| short_type_name(name)).collect();
        kinds.sort_unstable();
        f.debug_struct("MsgRouter")
            .field("handlers", &kinds)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
