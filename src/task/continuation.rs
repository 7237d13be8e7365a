use crate::error::{Result, RuntimeError};
use crate::message::Message;
use crate::service::ServiceHandle;
use crate::session::SessionId;
use crate::time::AwaitTimeout;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::task::{Context as PollContext, Poll};

/// Which handler a continuation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Start,
    Msg,
    Stop,
}

/// The await a continuation is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Waiting {
    pub(crate) session: SessionId,
    pub(crate) timeout: AwaitTimeout,
}

#[derive(Default)]
struct SlotState {
    waiting: Option<Waiting>,
    delivery: Option<(SessionId, Option<Message>)>,
}

/// Hand-off point between a service's executor and the [`Recv`](super::Recv)
/// futures running inside its continuations.
///
/// The innermost `Recv` publishes the session it waits for. The executor
/// reads it back after the poll, and before resuming it stores the reply, or
/// `None` for a timeout, for that `Recv` to pick up. Only one continuation of
/// a service is polled at a time, so one slot per service suffices.
#[derive(Default)]
pub(crate) struct AwaitSlot {
    state: Mutex<SlotState>,
}

impl AwaitSlot {
    pub(crate) fn suspend(&self, waiting: Waiting) -> Result<()> {
        let mut state = self.state.lock();
        match state.waiting {
            Some(current) => Err(RuntimeError::AwaitConflict(current.session)),
            None => {
                state.waiting = Some(waiting);
                Ok(())
            }
        }
    }

    pub(crate) fn take_delivery(&self, session: SessionId) -> Option<Option<Message>> {
        let mut state = self.state.lock();
        match state.delivery.take() {
            Some((delivered, result)) if delivered == session => Some(result),
            other => {
                state.delivery = other;
                None
            }
        }
    }

    fn deliver(&self, session: SessionId, result: Option<Message>) {
        self.state.lock().delivery = Some((session, result));
    }

    fn begin_poll(&self) {
        self.state.lock().waiting = None;
    }

    fn end_poll(&self) -> Option<Waiting> {
        let mut state = self.state.lock();
        state.delivery = None;
        state.waiting.take()
    }
}

pub(crate) type TaskFuture = BoxFuture<'static, Result<Option<Message>>>;

pub(crate) enum Step {
    Suspended(Waiting),
    Completed(Result<Option<Message>>),
}

/// A suspended handler invocation together with the request it answers.
pub(crate) struct Continuation {
    pub(crate) kind: TaskKind,
    pub(crate) sender: Option<ServiceHandle>,
    pub(crate) session: SessionId,
    future: TaskFuture,
}

impl Continuation {
    pub(crate) fn new(
        kind: TaskKind,
        sender: Option<ServiceHandle>,
        session: SessionId,
        future: TaskFuture,
    ) -> Self {
        Self {
            kind,
            sender,
            session,
            future,
        }
    }

    /// Polls once, optionally handing in the result of the await being resumed.
    pub(crate) fn resume(
        &mut self,
        slot: &AwaitSlot,
        delivery: Option<(SessionId, Option<Message>)>,
    ) -> Step {
        slot.begin_poll();
        if let Some((session, result)) = delivery {
            slot.deliver(session, result);
        }
        let waker = futures::task::noop_waker_ref();
        let mut cx = PollContext::from_waker(waker);
        let polled = catch_unwind(AssertUnwindSafe(|| self.future.as_mut().poll(&mut cx)));
        let waiting = slot.end_poll();
        match polled {
            Ok(Poll::Ready(outcome)) => Step::Completed(outcome),
            Ok(Poll::Pending) => match waiting {
                Some(waiting) => Step::Suspended(waiting),
                None => Step::Completed(Err(RuntimeError::ForeignSuspend)),
            },
            Err(panic) => Step::Completed(Err(RuntimeError::from_panic(panic))),
        }
    }
}
