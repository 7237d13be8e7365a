//! # Probe: a recording service for tests
//!
//! A [`Probe`] is a real service that forwards everything that happens to it
//! into a `tokio::sync::mpsc` channel: its start, every request it receives,
//! its stop and its exit. Tests await those events through [`ProbeEvents`]
//! and assert on them, the same way a mock client's request channel is
//! inspected.
//!
//! Replies are scripted. Each [`Probe::reply_with`] queues one answer, which
//! is returned to the next request in order. Requests arriving with an empty
//! queue get no reply.
//!
//! ```no_run
//! use actor_kernel::mock::Probe;
//! use actor_kernel::{ClockMode, Runtime, RuntimeConfig};
//!
//! # async fn demo() -> actor_kernel::Result<()> {
//! let runtime = Runtime::new(RuntimeConfig::default().with_clock(ClockMode::Manual))?;
//! let (probe, mut events) = Probe::new();
//! let target = runtime.new_service(probe.reply_with(42_u32))?;
//!
//! let port = runtime.port()?;
//! let answer: u32 = port.call(&target, "ping").await?;
//! assert_eq!(answer, 42);
//!
//! let request = events.expect_message::<&str>().await;
//! assert_eq!(request.message, "ping");
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::message::{short_type_name, Message};
use crate::service::{Context, Request, Service};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the `expect_*` helpers wait before failing the test.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ProbeEvent {
    Started(Option<Message>),
    Message(Request),
    Stopped(Option<Message>),
    Exited,
}

pub struct Probe {
    events: mpsc::UnboundedSender<ProbeEvent>,
    replies: Mutex<VecDeque<Message>>,
}

impl Probe {
    pub fn new() -> (Self, ProbeEvents) {
        let (events, receiver) = mpsc::unbounded_channel();
        let probe = Self {
            events,
            replies: Mutex::new(VecDeque::new()),
        };
        (probe, ProbeEvents { receiver })
    }

    /// Queues a reply for the next unanswered request.
    pub fn reply_with<T: Any + Send>(self, value: T) -> Self {
        self.replies.lock().push_back(Message::new(value));
        self
    }

    fn record(&self, event: ProbeEvent) {
        // The test may have dropped its receiver already.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Service for Probe {
    async fn on_start(
        self: Arc<Self>,
        _ctx: Context,
        req: Request<Option<Message>>,
    ) -> Result<Option<Message>> {
        self.record(ProbeEvent::Started(req.message));
        Ok(None)
    }

    async fn on_msg(self: Arc<Self>, _ctx: Context, req: Request) -> Result<Option<Message>> {
        let reply = self.replies.lock().pop_front();
        self.record(ProbeEvent::Message(req));
        Ok(reply)
    }

    async fn on_stop(
        self: Arc<Self>,
        _ctx: Context,
        req: Request<Option<Message>>,
    ) -> Result<Option<Message>> {
        self.record(ProbeEvent::Stopped(req.message));
        Ok(None)
    }

    fn on_exit(&self, _ctx: &Context) {
        self.record(ProbeEvent::Exited);
    }
}

/// Receiving side of a [`Probe`].
pub struct ProbeEvents {
    receiver: mpsc::UnboundedReceiver<ProbeEvent>,
}

impl ProbeEvents {
    /// Next event, or `None` if nothing arrives within `within`.
    pub async fn next_within(&mut self, within: Duration) -> Option<ProbeEvent> {
        tokio::time::timeout(within, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn next(&mut self) -> ProbeEvent {
        match self.next_within(EXPECT_TIMEOUT).await {
            Some(event) => event,
            None => panic!("Probe saw no event within {EXPECT_TIMEOUT:?}"),
        }
    }

    pub async fn expect_started(&mut self) -> Option<Message> {
        match self.next().await {
            ProbeEvent::Started(with) => with,
            other => panic!("Expected Started, got {other:?}"),
        }
    }

    /// Next request, skipping the start event. Panics unless its payload is a `T`.
    pub async fn expect_message<T: Any>(&mut self) -> Request<T> {
        loop {
            match self.next().await {
                ProbeEvent::Started(_) => continue,
                ProbeEvent::Message(Request {
                    sender,
                    session,
                    message,
                }) => {
                    let found = short_type_name(message.type_name()).to_string();
                    return match message.downcast::<T>() {
                        Ok(message) => Request {
                            sender,
                            session,
                            message,
                        },
                        Err(_) => panic!(
                            "Expected a {} message, got {found}",
                            short_type_name(std::any::type_name::<T>())
                        ),
                    };
                }
                other => panic!("Expected a message, got {other:?}"),
            }
        }
    }

    pub async fn expect_stopped(&mut self) -> Option<Message> {
        loop {
            match self.next().await {
                ProbeEvent::Stopped(with) => return with,
                ProbeEvent::Started(_) => continue,
                other => panic!("Expected Stopped, got {other:?}"),
            }
        }
    }

    pub async fn expect_exited(&mut self) {
        match self.next().await {
            ProbeEvent::Exited => {}
            other => panic!("Expected Exited, got {other:?}"),
        }
    }

    /// Asserts that nothing at all happens for `within`.
    pub async fn expect_silence(&mut self, within: Duration) {
        if let Some(event) = self.next_within(within).await {
            panic!("Expected silence, got {event:?}");
        }
    }
}
