use super::continuation::{AwaitSlot, Waiting};
use crate::error::{Result, RuntimeError};
use crate::time::{AwaitTimeout, MAX_DELAY};
use crate::session::SessionId;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as PollContext, Poll};

enum RecvState {
    Init,
    Waiting,
    Done,
}

/// Awaits the reply correlated with a session.
///
/// Resolves to the reply payload as `T`. A timeout resolves to
/// `Err(RuntimeError::SessionTimeout)`, a payload of another type to
/// `Err(RuntimeError::TypeMismatch)`.
///
/// `Recv` only makes progress inside a service handler. The handler's
/// executor resumes it when the reply arrives, so polling it from any other
/// executor leaves it pending forever.
#[must_use = "futures do nothing unless awaited"]
pub struct Recv<T> {
    slot: Arc<AwaitSlot>,
    session: SessionId,
    timeout: AwaitTimeout,
    state: RecvState,
    _reply: PhantomData<fn() -> T>,
}

impl<T> Recv<T> {
    pub(crate) fn new(slot: Arc<AwaitSlot>, session: SessionId) -> Self {
        Self {
            slot,
            session,
            timeout: AwaitTimeout::Default,
            state: RecvState::Init,
            _reply: PhantomData,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn with_timeout(mut self, ticks: u32) -> Self {
        self.timeout = AwaitTimeout::Ticks(ticks);
        self
    }

    pub fn never_timeout(mut self) -> Self {
        self.timeout = AwaitTimeout::Never;
        self
    }

    pub(crate) fn timeout(mut self, timeout: AwaitTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves to `Ok(None)` on timeout instead of an error.
    pub fn or_none(self) -> RecvOrNone<T> {
        RecvOrNone { inner: self }
    }
}

impl<T: Any> Future for Recv<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state {
            RecvState::Init => {
                if let AwaitTimeout::Ticks(ticks) = this.timeout {
                    if u64::from(ticks) > MAX_DELAY {
                        this.state = RecvState::Done;
                        return Poll::Ready(Err(RuntimeError::DelayOutOfRange(u64::from(ticks))));
                    }
                }
                if !this.session.is_valid() {
                    this.state = RecvState::Done;
                    return Poll::Ready(Err(RuntimeError::InvalidSession));
                }
                let waiting = Waiting {
                    session: this.session.to_send(),
                    timeout: this.timeout,
                };
                if let Err(conflict) = this.slot.suspend(waiting) {
                    this.state = RecvState::Done;
                    return Poll::Ready(Err(conflict));
                }
                this.state = RecvState::Waiting;
                Poll::Pending
            }
            RecvState::Waiting => match this.slot.take_delivery(this.session.to_send()) {
                Some(Some(reply)) => {
                    this.state = RecvState::Done;
                    Poll::Ready(reply.into_typed::<T>())
                }
                Some(None) => {
                    this.state = RecvState::Done;
                    Poll::Ready(Err(RuntimeError::SessionTimeout(this.session.to_send())))
                }
                None => {
                    // Polled without a delivery: keep the await registered.
                    let waiting = Waiting {
                        session: this.session.to_send(),
                        timeout: this.timeout,
                    };
                    match this.slot.suspend(waiting) {
                        Ok(()) => Poll::Pending,
                        Err(conflict) => {
                            this.state = RecvState::Done;
                            Poll::Ready(Err(conflict))
                        }
                    }
                }
            },
            RecvState::Done => panic!("Recv polled after completion"),
        }
    }
}

/// [`Recv`] that maps a timeout to `Ok(None)`.
#[must_use = "futures do nothing unless awaited"]
pub struct RecvOrNone<T> {
    inner: Recv<T>,
}

impl<T: Any> Future for RecvOrNone<T> {
    type Output = Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(reply)) => Poll::Ready(Ok(Some(reply))),
            Poll::Ready(Err(RuntimeError::SessionTimeout(_))) => Poll::Ready(Ok(None)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
        }
    }
}
