//! # Service Manager
//!
//! Registry of live services plus the ready-queue the worker pool drains.
//!
//! The registry owns the only strong references to idle services. Removing
//! a service from it is what destroys the service, once the last worker
//! holding it lets go. Handles are weak, so they simply stop resolving.
//!
//! A service sits in the ready-queue at most once. The `in_queue` flag is
//! claimed by whoever first sees new mail, and cleared by the worker after
//! it has processed one entry.

use crate::error::{Result, RuntimeError};
use crate::id::ServiceId;
use crate::message::MailEntry;
use crate::service::service_core::ServiceCore;
use crate::service::{ServiceHandle, ServiceStage};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct ReadyQueue {
    services: VecDeque<Arc<ServiceCore>>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct ServiceManager {
    services: Mutex<HashMap<ServiceId, Arc<ServiceCore>>>,
    names: Mutex<HashMap<String, ServiceHandle>>,
    ready: Mutex<ReadyQueue>,
    ready_signal: Condvar,
    dedicated: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registry
    // =========================================================================

    pub(crate) fn register(&self, core: Arc<ServiceCore>, name: Option<String>) -> Result<()> {
        if let Some(name) = name {
            self.set_name(&core.handle(), name)?;
        }
        self.services.lock().insert(core.id(), core);
        Ok(())
    }

    pub(crate) fn set_name(&self, handle: &ServiceHandle, name: String) -> Result<()> {
        let mut names = self.names.lock();
        if names.contains_key(&name) {
            return Err(RuntimeError::NameTaken(name));
        }
        debug!(service = %handle.id(), name = %name, "Service named");
        names.insert(name, handle.clone());
        Ok(())
    }

    pub(crate) fn is_name_taken(&self, name: &str) -> bool {
        self.names.lock().contains_key(name)
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<ServiceHandle> {
        self.names.lock().get(name).cloned()
    }

    pub(crate) fn find_by_id(&self, id: ServiceId) -> Option<ServiceHandle> {
        self.services.lock().get(&id).map(|core| core.handle())
    }

    /// Drops the registry's reference. Names pointing at the service go too.
    pub(crate) fn remove(&self, core: &ServiceCore) {
        let id = core.id();
        let removed = self.services.lock().remove(&id).is_some();
        self.names.lock().retain(|_, handle| handle.id() != id);
        if removed {
            info!(service = %id, kind = core.kind(), live = self.len(), "Service destroyed");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub(crate) fn handles(&self) -> Vec<ServiceHandle> {
        self.services.lock().values().map(|core| core.handle()).collect()
    }

    /// Services that have started and not yet exited.
    pub(crate) fn active(&self) -> usize {
        self.services
            .lock()
            .values()
            .filter(|core| !matches!(core.stage(), ServiceStage::Ready | ServiceStage::Exited))
            .count()
    }

    // =========================================================================
    // Delivery & ready-queue
    // =========================================================================

    /// Pushes to the target's mailbox and makes sure someone will process it.
    pub(crate) fn deliver(&self, target: &ServiceHandle, entry: MailEntry) -> bool {
        let Some(core) = target.upgrade() else {
            debug!(service = %target.id(), "Dropped message to dead service");
            return false;
        };
        if !core.push(entry) {
            debug!(service = %target.id(), "Dropped message to exited service");
            return false;
        }
        if !core.is_separate() {
            self.enqueue(&core);
        }
        true
    }

    pub(crate) fn enqueue(&self, core: &Arc<ServiceCore>) {
        if !core.enter_queue() {
            return;
        }
        let mut ready = self.ready.lock();
        if ready.closed {
            return;
        }
        ready.services.push_back(core.clone());
        drop(ready);
        self.ready_signal.notify_one();
    }

    /// Blocks until a service is ready. `None` means the queue was closed.
    pub(crate) fn pop_ready(&self) -> Option<Arc<ServiceCore>> {
        let mut ready = self.ready.lock();
        loop {
            if ready.closed {
                return None;
            }
            if let Some(core) = ready.services.pop_front() {
                return Some(core);
            }
            self.ready_signal.wait(&mut ready);
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    pub(crate) fn track_dedicated(&self, thread: JoinHandle<()>) {
        self.dedicated.lock().push(thread);
    }

    /// Releases every blocked worker and dedicated thread.
    pub(crate) fn close(&self) {
        {
            let mut ready = self.ready.lock();
            ready.closed = true;
            ready.services.clear();
        }
        self.ready_signal.notify_all();
        let cores: Vec<_> = self.services.lock().values().cloned().collect();
        for core in cores {
            core.wake();
        }
    }

    pub(crate) fn join_dedicated(&self) {
        let threads = std::mem::take(&mut *self.dedicated.lock());
        for thread in threads {
            if thread.join().is_err() {
                warn!("Dedicated service thread panicked");
            }
        }
    }

    /// Forgets every service. Breaks the service/kernel reference cycle.
    pub(crate) fn clear(&self) {
        let services = std::mem::take(&mut *self.services.lock());
        self.names.lock().clear();
        if !services.is_empty() {
            debug!(count = services.len(), "Dropping remaining services");
        }
    }
}
