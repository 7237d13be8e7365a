//! Worker threads.
//!
//! Shared workers pop a ready service, process exactly one message, and put
//! the service back if it still has mail. One message per turn keeps a
//! chatty service from starving the rest. Separate-worker services get a
//! dedicated thread that drains their mailbox directly.

use super::kernel::Kernel;
use crate::service::service_core::ServiceCore;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

pub(crate) fn spawn_pool(kernel: &Arc<Kernel>, count: usize) -> std::io::Result<Vec<JoinHandle<()>>> {
    (0..count)
        .map(|index| {
            let kernel = kernel.clone();
            thread::Builder::new()
                .name(format!("kernel-worker-{index}"))
                .spawn(move || run_shared(kernel, index))
        })
        .collect()
}

fn run_shared(kernel: Arc<Kernel>, index: usize) {
    debug!(worker = index, "Worker started");
    while let Some(core) = kernel.manager.pop_ready() {
        let processed = core.process_msgs(1);
        trace!(worker = index, service = %core.id(), processed, "Turn finished");
        core.leave_queue();
        if core.is_exited() {
            kernel.destroy(&core);
        } else if core.has_mail() {
            kernel.manager.enqueue(&core);
        }
    }
    debug!(worker = index, "Worker stopped");
}

pub(crate) fn spawn_dedicated(
    kernel: Arc<Kernel>,
    core: Arc<ServiceCore>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("kernel-{}", core.kind()))
        .spawn(move || run_dedicated(kernel, core))
}

fn run_dedicated(kernel: Arc<Kernel>, core: Arc<ServiceCore>) {
    debug!(service = %core.id(), kind = core.kind(), "Dedicated worker started");
    while let Some(entry) = core.wait_for_mail(|| kernel.is_closing()) {
        core.process(entry);
        if core.is_exited() {
            kernel.destroy(&core);
            break;
        }
    }
    debug!(service = %core.id(), "Dedicated worker stopped");
}
