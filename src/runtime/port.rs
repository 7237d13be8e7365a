//! # Port
//!
//! Entry point for code that is not a service: `main`, a tokio task, a test.
//!
//! A port is a small service of its own. [`Port::call`] hands it the request
//! together with a `oneshot` sender. The port service performs an ordinary
//! kernel `call` and forwards whatever comes back, reply or timeout, through
//! the channel. The caller just awaits the receiver on any async runtime.
//!
//! ```no_run
//! # use actor_kernel::{Runtime, RuntimeConfig, ServiceHandle};
//! # async fn demo(runtime: &Runtime, ledger: &ServiceHandle) -> actor_kernel::Result<()> {
//! let port = runtime.port()?;
//! let balance: u64 = port.call(ledger, 25_u64).await?;
//! # Ok(())
//! # }
//! ```

use super::kernel::Kernel;
use crate::error::{Result, RuntimeError};
use crate::message::Message;
use crate::service::{Context, Request, Service, ServiceHandle};
use crate::session::SessionId;
use crate::time::AwaitTimeout;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

struct PortCall {
    target: ServiceHandle,
    message: Message,
    timeout: AwaitTimeout,
    reply: oneshot::Sender<Result<Message>>,
}

pub(crate) struct PortService;

#[async_trait]
impl Service for PortService {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        let call: PortCall = req.message.into_typed()?;
        let session = ctx.send(&call.target, call.message);
        let reply = ctx.recv::<Message>(session).timeout(call.timeout).await;
        if call.reply.send(reply).is_err() {
            debug!(session = %session, "Port caller went away before the reply");
        }
        Ok(None)
    }
}

/// Bridge from outside the kernel into services.
#[derive(Clone)]
pub struct Port {
    handle: ServiceHandle,
    kernel: Arc<Kernel>,
}

impl Port {
    pub(crate) fn new(handle: ServiceHandle, kernel: Arc<Kernel>) -> Self {
        Self { handle, kernel }
    }

    /// The port's own service, seen as the sender of everything it sends.
    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    /// Fire-and-forget send. Replies come back to the port and are dropped.
    pub fn send<T: Any + Send>(&self, target: &ServiceHandle, message: T) -> SessionId {
        self.kernel
            .send(Some(&self.handle), target, Message::new(message))
    }

    pub async fn call<Resp: Any, Req: Any + Send>(
        &self,
        target: &ServiceHandle,
        request: Req,
    ) -> Result<Resp> {
        self.call_with_timeout(target, request, AwaitTimeout::Default)
            .await
    }

    pub async fn call_with_timeout<Resp: Any, Req: Any + Send>(
        &self,
        target: &ServiceHandle,
        request: Req,
        timeout: AwaitTimeout,
    ) -> Result<Resp> {
        let (reply, receiver) = oneshot::channel();
        let call = PortCall {
            target: target.clone(),
            message: Message::new(request),
            timeout,
            reply,
        };
        self.kernel
            .send(None, &self.handle, Message::new(call));
        let message = receiver.await.map_err(|_| RuntimeError::PortClosed)??;
        message.into_typed()
    }
}
