//! Runtime orchestration.
//!
//! - [`Runtime`]: owns the worker pool and the wheel drivers, and creates services
//! - [`Port`]: calls into services from outside the kernel
//! - [`setup_tracing`]: installs the log subscriber
//!
//! Internals: `kernel` (shared state and delivery), `manager` (registry and
//! ready-queue), `events` (subscriptions by event type), `worker` (pool and
//! dedicated threads).

mod events;
mod kernel;
mod manager;
pub mod port;
pub mod tracing;
mod worker;

pub(crate) use kernel::Kernel;
pub use port::Port;
pub use self::tracing::{setup_tracing, try_setup_tracing};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::id::ServiceId;
use crate::message::{Control, Message};
use crate::service::{Service, ServiceHandle, ServiceOptions};
use crate::session::SessionId;
use crate::time::WheelDriver;
use port::PortService;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use ::tracing::{info, warn};

/// A running kernel: worker threads, wheel drivers and the service registry.
///
/// Dropping the runtime shuts it down. Running services are stopped and
/// exited, waiting at most `shutdown_grace_ms` for them.
///
/// ```no_run
/// use actor_kernel::{Runtime, RuntimeConfig};
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_workers(4))?;
/// // runtime.new_service(...)
/// runtime.shutdown();
/// # Ok::<(), actor_kernel::RuntimeError>(())
/// ```
pub struct Runtime {
    kernel: Arc<Kernel>,
    workers: Vec<JoinHandle<()>>,
    drivers: Vec<WheelDriver>,
    stopped: bool,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let kernel = Arc::new(Kernel::new(config.clone()));
        let worker_count = config.worker_count();
        let workers = worker::spawn_pool(&kernel, worker_count)?;
        let mut runtime = Self {
            kernel,
            workers,
            drivers: Vec::new(),
            stopped: false,
        };

        if let Some(clock) = runtime.kernel.clock {
            let sessions = Arc::downgrade(&runtime.kernel);
            runtime.drivers.push(WheelDriver::spawn(
                "kernel-sessions",
                clock,
                config.tick(),
                move |elapsed| match sessions.upgrade() {
                    Some(kernel) => {
                        kernel.expire_sessions(elapsed);
                        true
                    }
                    None => false,
                },
            )?);
            let timers = Arc::downgrade(&runtime.kernel);
            runtime.drivers.push(WheelDriver::spawn(
                "kernel-timer",
                clock,
                config.tick(),
                move |elapsed| match timers.upgrade() {
                    Some(kernel) => {
                        kernel.expire_timers(elapsed);
                        true
                    }
                    None => false,
                },
            )?);
        }

        info!(
            workers = worker_count,
            tick_ms = config.tick_ms,
            clock = ?config.clock,
            "Runtime started"
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.kernel.config
    }

    /// Creates and starts a service with default options.
    pub fn new_service<S: Service>(&self, service: S) -> Result<ServiceHandle> {
        self.kernel.spawn(service, ServiceOptions::default())
    }

    pub fn spawn<S: Service>(&self, service: S, options: ServiceOptions) -> Result<ServiceHandle> {
        self.kernel.spawn(service, options)
    }

    /// Sends without a sender. Any reply is dropped.
    pub fn send<T: Any + Send>(&self, target: &ServiceHandle, message: T) -> SessionId {
        self.kernel.send(None, target, Message::new(message))
    }

    pub fn start_service(&self, target: &ServiceHandle, with: Option<Message>) -> SessionId {
        self.kernel
            .post_control(None, target, Control::Start(with))
    }

    pub fn stop_service(&self, target: &ServiceHandle, with: Option<Message>) -> SessionId {
        self.kernel
            .post_control(None, target, Control::Stop(with))
    }

    pub fn exit_service(&self, target: &ServiceHandle) {
        self.kernel.post_control(None, target, Control::Exit);
    }

    pub fn kill_service(&self, target: &ServiceHandle) {
        self.kernel.kill_service(target);
    }

    /// Delivers `message` to `target` after `ticks` ticks.
    pub fn timeout<T: Any + Send>(&self, ticks: u64, target: &ServiceHandle, message: T) -> Result<()> {
        self.kernel
            .schedule(ticks, target, Message::new(message))
    }

    pub fn find_service(&self, name: &str) -> Option<ServiceHandle> {
        self.kernel.manager.find_by_name(name)
    }

    /// Subscribes `subscriber` to events of type `E`. Higher priorities are
    /// delivered first.
    pub fn subscribe<E: Any>(&self, subscriber: &ServiceHandle, priority: u32) {
        self.kernel
            .events
            .subscribe(TypeId::of::<E>(), subscriber, priority);
    }

    pub fn unsubscribe<E: Any>(&self, subscriber: &ServiceHandle) -> bool {
        self.kernel.events.unsubscribe(TypeId::of::<E>(), subscriber)
    }

    /// Sends a copy of `event` to every subscriber of `E`, without a sender.
    /// Returns how many subscribers were sent a copy.
    pub fn publish<E: Any + Send + Clone>(&self, event: E) -> usize {
        self.kernel.publish(None, event)
    }

    /// Subscriptions to `E` still registered, including ones whose service
    /// is gone but not yet pruned.
    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.kernel.events.count(TypeId::of::<E>())
    }

    pub fn find_service_by_id(&self, id: ServiceId) -> Option<ServiceHandle> {
        self.kernel.manager.find_by_id(id)
    }

    /// Registered services, including ones not yet destroyed after exit.
    pub fn service_count(&self) -> usize {
        self.kernel.manager.len()
    }

    /// Session timeouts and timers not yet fired.
    pub fn pending_timeouts(&self) -> usize {
        self.kernel.pending_timeouts() + self.kernel.pending_timers()
    }

    /// Advances both wheels by `ticks`. Intended for [`ClockMode::Manual`](crate::ClockMode::Manual).
    /// With a realtime clock the drivers keep ticking on their own as well.
    pub fn advance(&self, ticks: u64) {
        self.kernel.advance(ticks);
    }

    /// Creates a [`Port`] for calling services from outside the kernel.
    pub fn port(&self) -> Result<Port> {
        let handle = self.kernel.spawn(PortService, ServiceOptions::default())?;
        Ok(Port::new(handle, self.kernel.clone()))
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for handle in self.kernel.manager.handles() {
            self.kernel.kill_service(&handle);
        }
        let deadline = Instant::now() + self.kernel.config.shutdown_grace();
        while self.kernel.manager.active() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let lingering = self.kernel.manager.active();
        if lingering > 0 {
            warn!(lingering, "Shutdown grace period elapsed with services still running");
        }

        self.kernel.begin_close();
        for driver in &mut self.drivers {
            driver.stop();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        self.kernel.manager.join_dedicated();
        self.kernel.manager.clear();
        info!("Runtime stopped");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}
