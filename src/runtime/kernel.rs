use super::events::EventRegistry;
use super::manager::ServiceManager;
use super::worker;
use crate::config::{ClockMode, RuntimeConfig};
use crate::error::{Result, RuntimeError};
use crate::id::ServiceIdGenerator;
use crate::message::{short_type_name, Control, MailEntry, Message, Payload};
use crate::service::service_core::ServiceCore;
use crate::service::{Service, ServiceHandle, ServiceOptions};
use crate::session::{SessionAllocator, SessionId};
use crate::time::{SessionMonitor, TickClock, Timer};
use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every service, worker and driver of one runtime.
pub(crate) struct Kernel {
    pub(crate) config: RuntimeConfig,
    pub(crate) manager: ServiceManager,
    pub(crate) monitor: SessionMonitor,
    pub(crate) events: EventRegistry,
    timer: Timer,
    /// Wall clock the drivers read; `None` with a manual clock.
    pub(crate) clock: Option<TickClock>,
    sessions: SessionAllocator,
    ids: ServiceIdGenerator,
    closing: AtomicBool,
}

impl Kernel {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        let clock = match config.clock {
            ClockMode::Realtime => Some(TickClock::new(config.tick())),
            ClockMode::Manual => None,
        };
        Self {
            manager: ServiceManager::new(),
            monitor: SessionMonitor::new(config.session_timeout_ticks, clock),
            events: EventRegistry::new(),
            timer: Timer::new(clock),
            clock,
            sessions: SessionAllocator::new(),
            ids: ServiceIdGenerator::new(config.node_id),
            closing: AtomicBool::new(false),
            config,
        }
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
        self.manager.close();
    }

    pub(crate) fn new_session(&self) -> SessionId {
        self.sessions.alloc().unwrap_or(SessionId::INVALID)
    }

    /// Sends under a fresh session. The message is dropped when no session
    /// can be allocated.
    pub(crate) fn send(
        &self,
        sender: Option<&ServiceHandle>,
        target: &ServiceHandle,
        message: Message,
    ) -> SessionId {
        let session = self.new_session();
        if !session.is_valid() {
            return session;
        }
        self.send_to(sender, target, session, message);
        session
    }

    pub(crate) fn send_to(
        &self,
        sender: Option<&ServiceHandle>,
        target: &ServiceHandle,
        session: SessionId,
        message: Message,
    ) -> bool {
        self.manager.deliver(
            target,
            MailEntry {
                sender: sender.cloned(),
                session,
                payload: Payload::User(message),
            },
        )
    }

    pub(crate) fn post_control(
        &self,
        sender: Option<&ServiceHandle>,
        target: &ServiceHandle,
        control: Control,
    ) -> SessionId {
        let session = match control {
            Control::SessionTimeout(_) | Control::Exit => SessionId::INVALID,
            _ => self.new_session(),
        };
        self.manager.deliver(
            target,
            MailEntry {
                sender: sender.cloned(),
                session,
                payload: Payload::Control(control),
            },
        );
        session
    }

    /// Stops `target` if needed and exits it once it is stopped. A service
    /// still in `Ready` skips `on_stop` and goes straight to `Stopped`.
    pub(crate) fn kill_service(&self, target: &ServiceHandle) {
        let Some(core) = target.upgrade() else {
            return;
        };
        core.request_exit();
        self.post_control(Some(target), target, Control::Stop(None));
        self.post_control(Some(target), target, Control::Exit);
    }

    pub(crate) fn schedule(&self, ticks: u64, target: &ServiceHandle, message: Message) -> Result<()> {
        self.timer.schedule(ticks, target, message)
    }

    pub(crate) fn spawn<S: Service>(
        self: &Arc<Self>,
        service: S,
        options: ServiceOptions,
    ) -> Result<ServiceHandle> {
        if self.is_closing() {
            return Err(RuntimeError::Shutdown);
        }
        if let Some(name) = &options.name {
            if self.manager.is_name_taken(name) {
                return Err(RuntimeError::NameTaken(name.clone()));
            }
        }

        let id = self.ids.next();
        let kind = short_type_name(type_name::<S>());
        let core = ServiceCore::new(id, kind, Arc::new(service), self.clone(), options.separate_worker);
        core.init()?;
        self.manager.register(core.clone(), options.name.clone())?;

        if options.separate_worker {
            match worker::spawn_dedicated(self.clone(), core.clone()) {
                Ok(thread) => self.manager.track_dedicated(thread),
                Err(err) => {
                    self.destroy(&core);
                    return Err(err.into());
                }
            }
        }
        let handle = core.handle();
        info!(service = %id, kind, separate = options.separate_worker, "Service created");

        if options.auto_start {
            self.post_control(None, &handle, Control::Start(None));
        }
        Ok(handle)
    }

    /// Forgets an exited service: registry entry, names and subscriptions.
    pub(crate) fn destroy(&self, core: &ServiceCore) {
        self.events.remove_service(&core.handle());
        self.manager.remove(core);
    }

    /// Copies `event` to every subscriber of its type and returns how many
    /// were sent a copy.
    pub(crate) fn publish<E: Any + Send + Clone>(&self, sender: Option<&ServiceHandle>, event: E) -> usize {
        let subscribers = self.events.subscribers(TypeId::of::<E>());
        for subscriber in &subscribers {
            self.send(sender, subscriber, Message::new(event.clone()));
        }
        debug!(
            kind = short_type_name(type_name::<E>()),
            subscribers = subscribers.len(),
            "Event published"
        );
        subscribers.len()
    }

    /// Moves both wheels forward and delivers whatever expired.
    pub(crate) fn advance(&self, elapsed: u64) {
        self.expire_sessions(elapsed);
        self.expire_timers(elapsed);
    }

    pub(crate) fn expire_sessions(&self, elapsed: u64) {
        for (service, session) in self.monitor.expire(elapsed) {
            self.post_control(None, &service, Control::SessionTimeout(session));
        }
    }

    pub(crate) fn expire_timers(&self, elapsed: u64) {
        for (service, message) in self.timer.expire(elapsed) {
            debug!(target_service = %service.id(), kind = short_type_name(message.type_name()), "Timer fired");
            self.send(Some(&service), &service, message);
        }
    }

    pub(crate) fn pending_timeouts(&self) -> usize {
        self.monitor.pending()
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timer.pending()
    }
}
