use super::{Request, Service, ServiceHandle, ServiceOptions};
use crate::error::Result;
use crate::id::ServiceId;
use crate::message::{Control, Message};
use crate::runtime::Kernel;
use crate::session::SessionId;
use crate::task::{AwaitSlot, Recv};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A service's view of the kernel.
///
/// Cheap to clone. Handlers take it by value so it can live across awaits.
#[derive(Clone)]
pub struct Context {
    handle: ServiceHandle,
    kernel: Arc<Kernel>,
    slot: Arc<AwaitSlot>,
}

impl Context {
    pub(crate) fn new(handle: ServiceHandle, kernel: Arc<Kernel>, slot: Arc<AwaitSlot>) -> Self {
        Self {
            handle,
            kernel,
            slot,
        }
    }

    pub(crate) fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// This service's own address.
    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    pub fn id(&self) -> ServiceId {
        self.handle.id()
    }

    /// Allocates a session without sending anything.
    pub fn new_session(&self) -> SessionId {
        self.kernel.new_session()
    }

    /// Sends `message` under a fresh session and returns it.
    ///
    /// Returns [`SessionId::INVALID`] only when the id space is exhausted. A
    /// dead target is not reported: awaiting the session will time out.
    pub fn send<T: Any + Send>(&self, target: &ServiceHandle, message: T) -> SessionId {
        self.kernel
            .send(Some(&self.handle), target, Message::new(message))
    }

    /// Sends under a session chosen by the caller.
    pub fn send_to<T: Any + Send>(
        &self,
        target: &ServiceHandle,
        session: SessionId,
        message: T,
    ) -> bool {
        self.kernel
            .send_to(Some(&self.handle), target, session, Message::new(message))
    }

    /// Answers the request that arrived under `session`.
    pub fn reply<T: Any + Send>(&self, target: &ServiceHandle, session: SessionId, message: T) -> bool {
        self.kernel
            .send_to(Some(&self.handle), target, session.to_reply(), Message::new(message))
    }

    pub fn reply_to<M, T: Any + Send>(&self, request: &Request<M>, message: T) -> bool {
        match &request.sender {
            Some(sender) => self.reply(sender, request.session, message),
            None => false,
        }
    }

    /// Suspends until the reply for `session` arrives.
    pub fn recv<T: Any>(&self, session: SessionId) -> Recv<T> {
        Recv::new(self.slot.clone(), session)
    }

    pub fn recv_with_timeout<T: Any>(&self, session: SessionId, ticks: u32) -> Recv<T> {
        self.recv(session).with_timeout(ticks)
    }

    /// Sends `request` and awaits the correlated reply as `Resp`.
    ///
    /// ```ignore
    /// let balance: u64 = ctx.call(&ledger, Deposit(10)).await?;
    /// ```
    pub fn call<Resp: Any, Req: Any + Send>(&self, target: &ServiceHandle, request: Req) -> Recv<Resp> {
        let session = self.send(target, request);
        self.recv(session)
    }

    pub fn call_with_timeout<Resp: Any, Req: Any + Send>(
        &self,
        target: &ServiceHandle,
        request: Req,
        ticks: u32,
    ) -> Recv<Resp> {
        self.call(target, request).with_timeout(ticks)
    }

    /// Delivers `message` to this service after `ticks` ticks.
    pub fn timeout<T: Any + Send>(&self, ticks: u64, message: T) -> Result<()> {
        self.kernel
            .schedule(ticks, &self.handle, Message::new(message))
    }

    pub fn timeout_to<T: Any + Send>(&self, ticks: u64, target: &ServiceHandle, message: T) -> Result<()> {
        self.kernel.schedule(ticks, target, Message::new(message))
    }

    pub fn new_service<S: Service>(&self, service: S) -> Result<ServiceHandle> {
        self.kernel.spawn(service, ServiceOptions::default())
    }

    pub fn spawn<S: Service>(&self, service: S, options: ServiceOptions) -> Result<ServiceHandle> {
        self.kernel.spawn(service, options)
    }

    /// Starts `target`. Its `on_start` return value is sent back as the
    /// reply to the returned session.
    pub fn start_service(&self, target: &ServiceHandle, with: Option<Message>) -> SessionId {
        self.kernel
            .post_control(Some(&self.handle), target, Control::Start(with))
    }

    pub fn stop_service(&self, target: &ServiceHandle, with: Option<Message>) -> SessionId {
        self.kernel
            .post_control(Some(&self.handle), target, Control::Stop(with))
    }

    pub fn exit_service(&self, target: &ServiceHandle) {
        self.kernel.post_control(Some(&self.handle), target, Control::Exit);
    }

    /// Stops `target` and exits it once stopped.
    pub fn kill_service(&self, target: &ServiceHandle) {
        self.kernel.kill_service(target);
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        self.kernel.manager.set_name(&self.handle, name.into())
    }

    pub fn find_service(&self, name: &str) -> Option<ServiceHandle> {
        self.kernel.manager.find_by_name(name)
    }

    /// Subscribes this service to events of type `E`. Subscribers with a
    /// higher priority receive an event first.
    pub fn subscribe<E: Any>(&self, priority: u32) {
        self.kernel
            .events
            .subscribe(TypeId::of::<E>(), &self.handle, priority);
    }

    pub fn unsubscribe<E: Any>(&self) -> bool {
        self.kernel.events.unsubscribe(TypeId::of::<E>(), &self.handle)
    }

    /// Sends a copy of `event` to every subscriber of `E`, this service
    /// included if it subscribed. Returns how many copies were sent.
    pub fn publish<E: Any + Send + Clone>(&self, event: E) -> usize {
        self.kernel.publish(Some(&self.handle), event)
    }

    /// Calls every subscriber of `E` in priority order, one at a time, and
    /// hands each reply to `on_reply`. A subscriber that does not answer in
    /// time is skipped. Returning `false` from `on_reply` stops the fan-out.
    ///
    /// Returns how many subscribers were called.
    ///
    /// ```ignore
    /// let mut vetoed = false;
    /// ctx.publish_call(Withdrawal(50), |reply| {
    ///     vetoed = matches!(reply.downcast_ref::<Verdict>(), Some(Verdict::Deny));
    ///     !vetoed
    /// })
    /// .await?;
    /// ```
    pub async fn publish_call<E, F>(&self, event: E, mut on_reply: F) -> Result<usize>
    where
        E: Any + Send + Clone,
        F: FnMut(Message) -> bool + Send,
    {
        let subscribers = self.kernel.events.subscribers(TypeId::of::<E>());
        let mut called = 0;
        for subscriber in &subscribers {
            called += 1;
            let reply = self
                .call::<Message, E>(subscriber, event.clone())
                .or_none()
                .await?;
            if let Some(reply) = reply {
                if !on_reply(reply) {
                    break;
                }
            }
        }
        Ok(called)
    }
}
