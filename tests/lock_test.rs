mod common;

use actor_kernel::mock::Probe;
use actor_kernel::{
    Context, Message, Request, Result, Service, ServiceHandle, ServiceLock, ServiceStage,
};
use async_trait::async_trait;
use common::{eventually, manual_runtime, ReplyTo, Replier};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Ping;

/// Read-modify-write across an await. `Bump(ticks)` gives the gate call
/// that many ticks to answer.
struct Bump(u32);

#[derive(Clone, Default)]
struct Shared {
    value: Arc<AtomicU64>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

struct Counter {
    gate: ServiceHandle,
    lock: ServiceLock,
    shared: Shared,
}

#[async_trait]
impl Service for Counter {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        let Bump(ticks) = req.message.into_typed()?;
        let _guard = self.lock.lock(&ctx).await?;
        self.shared.log.lock().push("enter");
        let read = self.shared.value.load(Ordering::SeqCst);
        let _: u32 = ctx.call_with_timeout(&self.gate, Ping, ticks).await?;
        self.shared.value.store(read + 1, Ordering::SeqCst);
        self.shared.log.lock().push("leave");
        Ok(None)
    }
}

#[tokio::test]
async fn second_handler_waits_for_the_first() {
    let runtime = manual_runtime();
    let (gate, mut gate_events) = Probe::new();
    let gate = runtime.new_service(gate).expect("Failed to create service");
    let replier = runtime.new_service(Replier).expect("Failed to create service");
    let shared = Shared::default();
    let counter = runtime
        .new_service(Counter {
            gate,
            lock: ServiceLock::new(),
            shared: shared.clone(),
        })
        .expect("Failed to create service");

    runtime.send(&counter, Bump(100));
    runtime.send(&counter, Bump(100));

    let first = gate_events.expect_message::<Ping>().await;
    // The second bump is parked on the lock and never reaches the gate.
    gate_events.expect_silence(Duration::from_millis(100)).await;
    assert_eq!(*shared.log.lock(), vec!["enter"]);

    runtime.send(
        &replier,
        ReplyTo {
            to: counter.clone(),
            session: first.session,
            value: 0_u32,
        },
    );
    let second = gate_events.expect_message::<Ping>().await;
    runtime.send(
        &replier,
        ReplyTo {
            to: counter.clone(),
            session: second.session,
            value: 0_u32,
        },
    );

    assert!(eventually(|| shared.value.load(Ordering::SeqCst) == 2).await);
    assert!(eventually(|| shared.log.lock().len() == 4).await);
    assert_eq!(*shared.log.lock(), vec!["enter", "leave", "enter", "leave"]);
}

#[tokio::test]
async fn failed_holder_hands_the_lock_on() {
    let runtime = manual_runtime();
    let (gate, mut gate_events) = Probe::new();
    let gate = runtime.new_service(gate).expect("Failed to create service");
    let replier = runtime.new_service(Replier).expect("Failed to create service");
    let shared = Shared::default();
    let counter = runtime
        .new_service(Counter {
            gate,
            lock: ServiceLock::new(),
            shared: shared.clone(),
        })
        .expect("Failed to create service");

    runtime.send(&counter, Bump(2));
    runtime.send(&counter, Bump(100));
    gate_events.expect_message::<Ping>().await;
    gate_events.expect_silence(Duration::from_millis(100)).await;

    // The first holder's call times out and its handler fails.
    assert!(eventually(|| runtime.pending_timeouts() == 1).await);
    runtime.advance(3);

    let second = gate_events.expect_message::<Ping>().await;
    runtime.send(
        &replier,
        ReplyTo {
            to: counter.clone(),
            session: second.session,
            value: 0_u32,
        },
    );

    assert!(eventually(|| shared.log.lock().len() == 3).await);
    assert_eq!(*shared.log.lock(), vec!["enter", "enter", "leave"]);
    assert_eq!(shared.value.load(Ordering::SeqCst), 1);
    assert_eq!(counter.stage(), Some(ServiceStage::Running));
}
