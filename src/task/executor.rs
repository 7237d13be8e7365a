//! # Task Executor
//!
//! Per-service table of suspended continuations keyed by the send-id each
//! one awaits.
//!
//! - [`TaskExecutor::add_task`] runs a fresh continuation until it
//!   completes or suspends.
//! - [`TaskExecutor::try_schedule`] feeds a reply into the continuation
//!   waiting for it. A continuation that suspends again is re-filed under its
//!   new session.
//! - [`TaskExecutor::task_timeout`] resumes a waiting continuation with a
//!   timeout result.
//!
//! Handler failures stop here: they are logged and the continuation is
//! dropped. The owning service only learns what kind of task finished and
//! how.

use super::continuation::{AwaitSlot, Continuation, Step, TaskKind, Waiting};
use crate::error::{Result, RuntimeError};
use crate::message::Message;
use crate::service::ServiceHandle;
use crate::session::SessionId;
use crate::time::AwaitTimeout;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Registers suspended awaits with whatever enforces their timeouts.
pub(crate) trait SessionWatch {
    fn watch(&self, session: SessionId, timeout: AwaitTimeout);
}

/// A continuation that ran to completion, successfully or not.
#[derive(Debug)]
pub(crate) struct Finished {
    pub(crate) kind: TaskKind,
    pub(crate) sender: Option<ServiceHandle>,
    pub(crate) session: SessionId,
    pub(crate) outcome: Result<Option<Message>>,
}

pub(crate) enum Schedule {
    /// Nobody waits for this session; the message is handed back.
    Unmatched(Message),
    /// The continuation consumed the message and suspended again.
    Pending,
    Finished(Finished),
}

pub(crate) struct TaskExecutor {
    tasks: HashMap<SessionId, Continuation>,
    slot: Arc<AwaitSlot>,
}

impl TaskExecutor {
    pub(crate) fn new(slot: Arc<AwaitSlot>) -> Self {
        Self {
            tasks: HashMap::new(),
            slot,
        }
    }

    pub(crate) fn add_task(
        &mut self,
        mut task: Continuation,
        watch: &dyn SessionWatch,
    ) -> Option<Finished> {
        let step = task.resume(&self.slot, None);
        self.settle(task, step, watch)
    }

    /// `session` is the send flavor of the reply's session.
    pub(crate) fn try_schedule(
        &mut self,
        session: SessionId,
        message: Message,
        watch: &dyn SessionWatch,
    ) -> Schedule {
        let Some(mut task) = self.tasks.remove(&session) else {
            return Schedule::Unmatched(message);
        };
        let step = task.resume(&self.slot, Some((session, Some(message))));
        match self.settle(task, step, watch) {
            Some(finished) => Schedule::Finished(finished),
            None => Schedule::Pending,
        }
    }

    /// Returns `None` when nothing waits for `session` any more.
    pub(crate) fn task_timeout(
        &mut self,
        session: SessionId,
        watch: &dyn SessionWatch,
    ) -> Option<(TaskKind, Option<Finished>)> {
        let Some(mut task) = self.tasks.remove(&session) else {
            debug!(session = %session, "Timeout for settled session ignored");
            return None;
        };
        warn!(session = %session, kind = ?task.kind, "Session timed out");
        let kind = task.kind;
        let step = task.resume(&self.slot, Some((session, None)));
        Some((kind, self.settle(task, step, watch)))
    }

    pub(crate) fn awaiting(&self, session: SessionId) -> Option<TaskKind> {
        self.tasks.get(&session).map(|task| task.kind)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drops every suspended continuation.
    pub(crate) fn clear(&mut self) -> usize {
        let abandoned = self.tasks.len();
        self.tasks.clear();
        abandoned
    }

    fn settle(
        &mut self,
        task: Continuation,
        step: Step,
        watch: &dyn SessionWatch,
    ) -> Option<Finished> {
        match step {
            Step::Suspended(Waiting { session, timeout }) => {
                if self.tasks.contains_key(&session) {
                    return Some(Self::finish(
                        task,
                        Err(RuntimeError::SessionAlreadyAwaited(session)),
                    ));
                }
                watch.watch(session, timeout);
                self.tasks.insert(session, task);
                None
            }
            Step::Completed(outcome) => Some(Self::finish(task, outcome)),
        }
    }

    fn finish(task: Continuation, outcome: Result<Option<Message>>) -> Finished {
        if let Err(err) = &outcome {
            error!(session = %task.session, kind = ?task.kind, error = %err, "Continuation failed");
        }
        Finished {
            kind: task.kind,
            sender: task.sender,
            session: task.session,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Recv;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<(SessionId, AwaitTimeout)>>);

    impl SessionWatch for Recorder {
        fn watch(&self, session: SessionId, timeout: AwaitTimeout) {
            self.0.borrow_mut().push((session, timeout));
        }
    }

    fn sid(raw: u64) -> SessionId {
        SessionId::from_raw(raw)
    }

    fn task<F>(kind: TaskKind, future: F) -> Continuation
    where
        F: std::future::Future<Output = Result<Option<Message>>> + Send + 'static,
    {
        Continuation::new(kind, None, sid(100), Box::pin(future))
    }

    fn reply_value(finished: Finished) -> u32 {
        finished
            .outcome
            .expect("handler succeeded")
            .expect("handler replied")
            .into_typed::<u32>()
            .expect("u32 reply")
    }

    #[test]
    fn synchronous_task_finishes_immediately() {
        let slot = Arc::new(AwaitSlot::default());
        let mut exec = TaskExecutor::new(slot);
        let watch = Recorder::default();

        let done = exec
            .add_task(task(TaskKind::Msg, async { Ok::<_, RuntimeError>(Some(Message::new(3_u32))) }), &watch)
            .expect("finished");
        assert_eq!(done.session, sid(100));
        assert_eq!(reply_value(done), 3);
        assert!(exec.is_empty());
        assert!(watch.0.borrow().is_empty());
    }

    #[test]
    fn suspended_task_is_repushed_under_new_session() {
        let slot = Arc::new(AwaitSlot::default());
        let mut exec = TaskExecutor::new(slot.clone());
        let watch = Recorder::default();

        let s = slot.clone();
        let body = async move {
            let a: u32 = Recv::new(s.clone(), sid(1)).await?;
            let b: u32 = Recv::new(s, sid(2)).with_timeout(7).await?;
            Ok::<_, RuntimeError>(Some(Message::new(a + b)))
        };
        assert!(exec.add_task(task(TaskKind::Msg, body), &watch).is_none());
        assert_eq!(exec.awaiting(sid(1)), Some(TaskKind::Msg));

        assert!(matches!(
            exec.try_schedule(sid(1), Message::new(10_u32), &watch),
            Schedule::Pending
        ));
        assert_eq!(exec.awaiting(sid(1)), None);
        assert_eq!(exec.awaiting(sid(2)), Some(TaskKind::Msg));
        assert_eq!(exec.len(), 1);

        match exec.try_schedule(sid(2), Message::new(5_u32), &watch) {
            Schedule::Finished(done) => assert_eq!(reply_value(done), 15),
            _ => panic!("expected completion"),
        }
        assert!(exec.is_empty());
        assert_eq!(
            *watch.0.borrow(),
            vec![(sid(1), AwaitTimeout::Default), (sid(2), AwaitTimeout::Ticks(7))]
        );
    }

    #[test]
    fn unmatched_reply_is_handed_back() {
        let mut exec = TaskExecutor::new(Arc::new(AwaitSlot::default()));
        let watch = Recorder::default();
        match exec.try_schedule(sid(9), Message::new(1_u32), &watch) {
            Schedule::Unmatched(msg) => assert!(msg.is::<u32>()),
            _ => panic!("expected the message back"),
        }
    }

    #[test]
    fn timeout_resumes_with_error_and_late_reply_is_ignored() {
        let slot = Arc::new(AwaitSlot::default());
        let mut exec = TaskExecutor::new(slot.clone());
        let watch = Recorder::default();

        let s = slot.clone();
        let body = async move {
            let reply = Recv::<u32>::new(s, sid(4)).or_none().await?;
            Ok::<_, RuntimeError>(Some(Message::new(reply.is_none())))
        };
        assert!(exec.add_task(task(TaskKind::Start, body), &watch).is_none());

        let (kind, done) = exec.task_timeout(sid(4), &watch).expect("task was waiting");
        assert_eq!(kind, TaskKind::Start);
        let timed_out = done
            .expect("finished")
            .outcome
            .unwrap()
            .unwrap()
            .into_typed::<bool>()
            .unwrap();
        assert!(timed_out);

        assert!(exec.task_timeout(sid(4), &watch).is_none());
        assert!(matches!(
            exec.try_schedule(sid(4), Message::new(1_u32), &watch),
            Schedule::Unmatched(_)
        ));
    }

    #[test]
    fn panics_and_foreign_suspends_are_contained() {
        let mut exec = TaskExecutor::new(Arc::new(AwaitSlot::default()));
        let watch = Recorder::default();

        let done = exec
            .add_task(
                task(TaskKind::Msg, async {
                    if true {
                        panic!("handler blew up");
                    }
                    Ok::<_, RuntimeError>(None)
                }),
                &watch,
            )
            .expect("finished");
        assert!(matches!(done.outcome, Err(RuntimeError::Panicked(_))));

        let done = exec
            .add_task(
                task(TaskKind::Msg, async {
                    futures::future::pending::<()>().await;
                    Ok::<_, RuntimeError>(None)
                }),
                &watch,
            )
            .expect("finished");
        assert!(matches!(done.outcome, Err(RuntimeError::ForeignSuspend)));
        assert!(exec.is_empty());
    }

    #[test]
    fn second_waiter_on_same_session_is_rejected() {
        let slot = Arc::new(AwaitSlot::default());
        let mut exec = TaskExecutor::new(slot.clone());
        let watch = Recorder::default();

        for _ in 0..2 {
            let s = slot.clone();
            let _ = exec.add_task(
                task(TaskKind::Msg, async move {
                    let _: u32 = Recv::new(s, sid(8)).await?;
                    Ok::<_, RuntimeError>(None)
                }),
                &watch,
            );
        }
        assert_eq!(exec.len(), 1);
        assert_eq!(watch.0.borrow().len(), 1);
        assert_eq!(exec.clear(), 1);
    }

    #[test]
    fn typed_mismatch_surfaces_as_error() {
        let slot = Arc::new(AwaitSlot::default());
        let mut exec = TaskExecutor::new(slot.clone());
        let watch = Recorder::default();

        let s = slot.clone();
        let body = async move {
            let _: String = Recv::new(s, sid(3)).await?;
            Ok::<_, RuntimeError>(None)
        };
        assert!(exec.add_task(task(TaskKind::Msg, body), &watch).is_none());
        match exec.try_schedule(sid(3), Message::new(1_u32), &watch) {
            Schedule::Finished(done) => {
                assert!(matches!(done.outcome, Err(RuntimeError::TypeMismatch { .. })))
            }
            _ => panic!("expected completion"),
        }
    }
}
