//! # Service Core
//!
//! Runtime state behind a [`ServiceHandle`]: the mailbox, the lifecycle stage
//! and the continuation table.
//!
//! The mailbox has its own lock so that senders on any thread never wait for
//! a handler to finish. Everything a handler can observe lives in one
//! [`ServiceCell`] locked for the whole of `process`. Only the worker that
//! popped the service ever takes that lock, so it is never contended. The
//! stage is mirrored into an atomic so handles and workers can read it
//! without the cell.

use super::{Context, Request, Service, ServiceHandle, ServiceStage};
use crate::error::{Result, RuntimeError};
use crate::id::ServiceId;
use crate::message::{Control, MailEntry, Message, Payload};
use crate::runtime::Kernel;
use crate::session::SessionId;
use crate::task::{
    AwaitSlot, Continuation, Finished, Schedule, SessionWatch, TaskExecutor, TaskKind,
};
use crate::time::{AwaitTimeout, SessionMonitor};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct ServiceCell {
    service: Arc<dyn Service>,
    ctx: Context,
    executor: TaskExecutor,
}

/// Registers this service's awaits with the session monitor.
struct MonitorWatch<'a> {
    monitor: &'a SessionMonitor,
    handle: &'a ServiceHandle,
}

impl SessionWatch for MonitorWatch<'_> {
    fn watch(&self, session: SessionId, timeout: AwaitTimeout) {
        if let Err(err) = self.monitor.watch(self.handle, session, timeout) {
            error!(service = %self.handle.id(), session = %session, error = %err, "Timeout not registered");
        }
    }
}

pub(crate) struct ServiceCore {
    id: ServiceId,
    kind: &'static str,
    handle: ServiceHandle,
    mailbox: Mutex<VecDeque<MailEntry>>,
    /// Wakes the dedicated thread of a separate-worker service.
    mail_signal: Option<Condvar>,
    in_queue: AtomicBool,
    stage: AtomicU8,
    exit_requested: AtomicBool,
    cell: Mutex<ServiceCell>,
}

impl ServiceCore {
    pub(crate) fn new(
        id: ServiceId,
        kind: &'static str,
        service: Arc<dyn Service>,
        kernel: Arc<Kernel>,
        separate_worker: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let handle = ServiceHandle::new(id, weak.clone());
            let slot = Arc::new(AwaitSlot::default());
            let ctx = Context::new(handle.clone(), kernel, slot.clone());
            ServiceCore {
                id,
                kind,
                handle,
                mailbox: Mutex::new(VecDeque::new()),
                mail_signal: separate_worker.then(Condvar::new),
                in_queue: AtomicBool::new(false),
                stage: AtomicU8::new(ServiceStage::Ready as u8),
                exit_requested: AtomicBool::new(false),
                cell: Mutex::new(ServiceCell {
                    service,
                    ctx,
                    executor: TaskExecutor::new(slot),
                }),
            }
        })
    }

    pub(crate) fn id(&self) -> ServiceId {
        self.id
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub(crate) fn stage(&self) -> ServiceStage {
        ServiceStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    pub(crate) fn is_exited(&self) -> bool {
        self.stage() == ServiceStage::Exited
    }

    pub(crate) fn is_separate(&self) -> bool {
        self.mail_signal.is_some()
    }

    fn set_stage(&self, stage: ServiceStage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    /// Runs `on_init`. Panics count as failures.
    pub(crate) fn init(&self) -> Result<()> {
        let cell = self.cell.lock();
        match catch_unwind(AssertUnwindSafe(|| cell.service.on_init(&cell.ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(service = %self.id, kind = self.kind, error = %err, "on_init failed");
                Err(RuntimeError::InitFailed(err.to_string()))
            }
            Err(panic) => {
                let err = RuntimeError::from_panic(panic);
                warn!(service = %self.id, kind = self.kind, error = %err, "on_init panicked");
                Err(RuntimeError::InitFailed(err.to_string()))
            }
        }
    }

    // =========================================================================
    // Mailbox & queue bookkeeping
    // =========================================================================

    /// Appends to the mailbox. Rejected once the service has exited.
    pub(crate) fn push(&self, entry: MailEntry) -> bool {
        if self.is_exited() {
            return false;
        }
        let mut mailbox = self.mailbox.lock();
        mailbox.push_back(entry);
        if let Some(signal) = &self.mail_signal {
            signal.notify_one();
        }
        true
    }

    pub(crate) fn has_mail(&self) -> bool {
        !self.mailbox.lock().is_empty()
    }

    /// Marks the service as queued. `false` if it already was.
    pub(crate) fn enter_queue(&self) -> bool {
        !self.in_queue.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn leave_queue(&self) {
        self.in_queue.store(false, Ordering::Release);
    }

    /// Blocks a dedicated thread until mail arrives. `None` once `closed`
    /// reports true and the mailbox is drained.
    pub(crate) fn wait_for_mail(&self, closed: impl Fn() -> bool) -> Option<MailEntry> {
        let signal = self.mail_signal.as_ref()?;
        let mut mailbox = self.mailbox.lock();
        loop {
            if let Some(entry) = mailbox.pop_front() {
                return Some(entry);
            }
            if closed() {
                return None;
            }
            signal.wait(&mut mailbox);
        }
    }

    /// Wakes a dedicated thread so it can notice shutdown.
    pub(crate) fn wake(&self) {
        if let Some(signal) = &self.mail_signal {
            let _mailbox = self.mailbox.lock();
            signal.notify_all();
        }
    }

    /// Asks for `Exit` to follow as soon as the service reaches `Stopped`.
    pub(crate) fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Handles up to `count` queued entries, stopping early on exit.
    pub(crate) fn process_msgs(&self, count: usize) -> usize {
        let mut processed = 0;
        while processed < count && !self.is_exited() {
            let Some(entry) = self.mailbox.lock().pop_front() else {
                break;
            };
            self.process(entry);
            processed += 1;
        }
        processed
    }

    pub(crate) fn process(&self, entry: MailEntry) {
        let mut guard = self.cell.lock();
        let cell = &mut *guard;
        let kernel = cell.ctx.kernel().clone();
        let watch = MonitorWatch {
            monitor: &kernel.monitor,
            handle: &self.handle,
        };
        let MailEntry {
            sender,
            session,
            payload,
        } = entry;

        match payload {
            Payload::Control(Control::Start(with)) => {
                if self.stage() != ServiceStage::Ready {
                    debug!(service = %self.id, stage = ?self.stage(), "Start ignored");
                    return;
                }
                self.set_stage(ServiceStage::Starting);
                let request = Request {
                    sender: sender.clone(),
                    session,
                    message: with,
                };
                let future = cell.service.clone().on_start(cell.ctx.clone(), request);
                let task = Continuation::new(TaskKind::Start, sender, session, future);
                if let Some(done) = cell.executor.add_task(task, &watch) {
                    self.complete(&kernel, done);
                }
            }
            Payload::Control(Control::Stop(with)) => {
                if self.stage() == ServiceStage::Ready && self.exit_requested() {
                    // Killed before it ever started: no on_stop, the queued Exit follows.
                    self.set_stage(ServiceStage::Stopped);
                    info!(service = %self.id, kind = self.kind, "Service stopped before start");
                    return;
                }
                if self.stage() != ServiceStage::Running {
                    debug!(service = %self.id, stage = ?self.stage(), "Stop ignored");
                    return;
                }
                self.set_stage(ServiceStage::Stopping);
                let request = Request {
                    sender: sender.clone(),
                    session,
                    message: with,
                };
                let future = cell.service.clone().on_stop(cell.ctx.clone(), request);
                let task = Continuation::new(TaskKind::Stop, sender, session, future);
                if let Some(done) = cell.executor.add_task(task, &watch) {
                    self.complete(&kernel, done);
                }
            }
            Payload::Control(Control::Exit) => {
                if self.stage() != ServiceStage::Stopped {
                    debug!(service = %self.id, stage = ?self.stage(), "Exit ignored");
                    return;
                }
                self.exit(cell);
            }
            Payload::Control(Control::SessionTimeout(timed_out)) => {
                let Some((kind, done)) = cell.executor.task_timeout(timed_out, &watch) else {
                    return;
                };
                match kind {
                    TaskKind::Start | TaskKind::Stop => self.abort(&kernel, kind),
                    TaskKind::Msg => {
                        if let Some(done) = done {
                            self.complete(&kernel, done);
                        }
                    }
                }
            }
            Payload::User(message) => self.dispatch(cell, &kernel, &watch, sender, session, message),
        }
    }

    fn dispatch(
        &self,
        cell: &mut ServiceCell,
        kernel: &Kernel,
        watch: &MonitorWatch<'_>,
        sender: Option<ServiceHandle>,
        session: SessionId,
        message: Message,
    ) {
        match self.stage() {
            ServiceStage::Starting | ServiceStage::Stopping => {
                let in_flight = session.is_reply()
                    && matches!(
                        cell.executor.awaiting(session.to_send()),
                        Some(TaskKind::Start | TaskKind::Stop)
                    );
                if !in_flight {
                    debug!(service = %self.id, session = %session, stage = ?self.stage(), "Message dropped during transition");
                    return;
                }
                self.schedule(cell, kernel, watch, session, message);
            }
            ServiceStage::Running if session.is_reply() => {
                self.schedule(cell, kernel, watch, session, message);
            }
            ServiceStage::Running => {
                let request = Request {
                    sender: sender.clone(),
                    session,
                    message,
                };
                let future = cell.service.clone().on_msg(cell.ctx.clone(), request);
                let task = Continuation::new(TaskKind::Msg, sender, session, future);
                if let Some(done) = cell.executor.add_task(task, watch) {
                    self.complete(kernel, done);
                }
            }
            stage => {
                debug!(service = %self.id, session = %session, ?stage, "Message dropped");
            }
        }
    }

    fn schedule(
        &self,
        cell: &mut ServiceCell,
        kernel: &Kernel,
        watch: &MonitorWatch<'_>,
        session: SessionId,
        message: Message,
    ) {
        match cell.executor.try_schedule(session.to_send(), message, watch) {
            Schedule::Unmatched(message) => {
                debug!(service = %self.id, session = %session, kind = message.type_name(), "Unmatched reply dropped");
            }
            Schedule::Pending => {}
            Schedule::Finished(done) => self.complete(kernel, done),
        }
    }

    /// Applies the effects of a finished continuation.
    fn complete(&self, kernel: &Kernel, done: Finished) {
        match (done.kind, done.outcome.is_ok()) {
            (TaskKind::Start, true) => {
                self.set_stage(ServiceStage::Running);
                info!(service = %self.id, kind = self.kind, "Service started");
                if self.exit_requested() {
                    kernel.post_control(Some(&self.handle), &self.handle, Control::Stop(None));
                }
            }
            (TaskKind::Stop, true) => {
                self.set_stage(ServiceStage::Stopped);
                info!(service = %self.id, kind = self.kind, "Service stopped");
                if self.exit_requested() {
                    kernel.post_control(Some(&self.handle), &self.handle, Control::Exit);
                }
            }
            (TaskKind::Start | TaskKind::Stop, false) => {
                self.abort(kernel, done.kind);
                return;
            }
            (TaskKind::Msg, _) => {}
        }

        if let Ok(Some(reply)) = done.outcome {
            self.reply(kernel, done.sender, done.session, reply);
        }
    }

    /// A failed or timed-out start/stop leaves the service unusable.
    fn abort(&self, kernel: &Kernel, kind: TaskKind) {
        warn!(service = %self.id, kind = self.kind, task = ?kind, "Lifecycle handler failed, forcing exit");
        self.set_stage(ServiceStage::Stopped);
        kernel.post_control(Some(&self.handle), &self.handle, Control::Exit);
    }

    fn reply(&self, kernel: &Kernel, to: Option<ServiceHandle>, session: SessionId, reply: Message) {
        match to {
            Some(to) if session.is_valid() => {
                kernel.send_to(Some(&self.handle), &to, session.to_reply(), reply);
            }
            _ => {
                debug!(service = %self.id, session = %session, "Reply dropped: nobody to answer");
            }
        }
    }

    fn exit(&self, cell: &mut ServiceCell) {
        self.set_stage(ServiceStage::Exited);
        let service = &cell.service;
        let ctx = &cell.ctx;
        if catch_unwind(AssertUnwindSafe(|| service.on_exit(ctx))).is_err() {
            error!(service = %self.id, kind = self.kind, "on_exit panicked");
        }
        let abandoned = cell.executor.clear();
        let dropped = {
            let mut mailbox = self.mailbox.lock();
            let dropped = mailbox.len();
            mailbox.clear();
            dropped
        };
        info!(service = %self.id, kind = self.kind, abandoned, dropped, "Service exited");
    }
}
