mod common;

use actor_kernel::mock::Probe;
use actor_kernel::{
    AwaitTimeout, Context, Message, Request, Result, RuntimeError, Service, ServiceHandle, MAX_DELAY,
};
use async_trait::async_trait;
use common::{eventually, manual_runtime, realtime_runtime, ReplyTo, Replier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct Go;
struct Ping;

/// Calls a silent target with a 100-tick timeout and reports the outcome.
struct Caller {
    target: ServiceHandle,
    resumed: AtomicUsize,
    outcomes: mpsc::UnboundedSender<Option<u32>>,
}

#[async_trait]
impl Service for Caller {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        req.message.into_typed::<Go>()?;
        let reply = ctx
            .call_with_timeout::<u32, _>(&self.target, Ping, 100)
            .or_none()
            .await?;
        self.resumed.fetch_add(1, Ordering::SeqCst);
        let _ = self.outcomes.send(reply);
        Ok(None)
    }
}

fn caller(target: ServiceHandle) -> (Arc<Caller>, mpsc::UnboundedReceiver<Option<u32>>) {
    let (outcomes, receiver) = mpsc::unbounded_channel();
    let caller = Arc::new(Caller {
        target,
        resumed: AtomicUsize::new(0),
        outcomes,
    });
    (caller, receiver)
}

/// Lets the test keep the `Arc` to inspect counters.
struct Shared(Arc<Caller>);

#[async_trait]
impl Service for Shared {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        self.0.clone().on_msg(ctx, req).await
    }
}

#[tokio::test]
async fn unanswered_call_times_out_after_exactly_its_timeout() {
    let runtime = manual_runtime();
    let (probe, mut events) = Probe::new();
    let silent = runtime.new_service(probe).expect("Failed to create service");
    let (state, mut outcomes) = caller(silent);
    let caller = runtime
        .new_service(Shared(state.clone()))
        .expect("Failed to create service");

    runtime.send(&caller, Go);
    events.expect_message::<Ping>().await;
    assert!(eventually(|| runtime.pending_timeouts() == 1).await);

    runtime.advance(100);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.resumed.load(Ordering::SeqCst), 0);

    runtime.advance(1);
    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("Caller never resumed");
    assert_eq!(outcome, Some(None));

    runtime.advance(1_000);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.resumed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_reply_after_timeout_is_ignored() {
    let runtime = manual_runtime();
    let (probe, mut events) = Probe::new();
    let silent = runtime.new_service(probe).expect("Failed to create service");
    let replier = runtime.new_service(Replier).expect("Failed to create service");
    let (state, mut outcomes) = caller(silent);
    let caller = runtime
        .new_service(Shared(state.clone()))
        .expect("Failed to create service");

    runtime.send(&caller, Go);
    let request = events.expect_message::<Ping>().await;
    assert!(eventually(|| runtime.pending_timeouts() == 1).await);
    runtime.advance(101);
    assert_eq!(outcomes.recv().await, Some(None));

    runtime.send(
        &replier,
        ReplyTo {
            to: request.sender.expect("Ping had a sender"),
            session: request.session,
            value: 5_u32,
        },
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.resumed.load(Ordering::SeqCst), 1);
    assert!(caller.is_alive());
}

#[tokio::test]
async fn answered_call_does_not_time_out_later() {
    let runtime = manual_runtime();
    let (probe, mut events) = Probe::new();
    let silent = runtime.new_service(probe).expect("Failed to create service");
    let replier = runtime.new_service(Replier).expect("Failed to create service");
    let (state, mut outcomes) = caller(silent);
    let caller = runtime
        .new_service(Shared(state.clone()))
        .expect("Failed to create service");

    runtime.send(&caller, Go);
    let request = events.expect_message::<Ping>().await;
    runtime.send(
        &replier,
        ReplyTo {
            to: request.sender.expect("Ping had a sender"),
            session: request.session,
            value: 9_u32,
        },
    );
    assert_eq!(outcomes.recv().await, Some(Some(9)));

    runtime.advance(500);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.resumed.load(Ordering::SeqCst), 1);
    assert!(caller.is_alive());
}

#[tokio::test]
async fn realtime_clock_enforces_timeouts() {
    let runtime = realtime_runtime();
    let (probe, _events) = Probe::new();
    let silent = runtime.new_service(probe).expect("Failed to create service");
    let port = runtime.port().expect("Failed to create port");

    let started = Instant::now();
    let err = port
        .call_with_timeout::<u32, _>(&silent, Ping, AwaitTimeout::Ticks(20))
        .await
        .expect_err("Nobody answers");
    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn timer_delivers_after_delay() {
    let runtime = manual_runtime();
    let (probe, mut events) = Probe::new();
    let target = runtime.new_service(probe).expect("Failed to create service");
    events.expect_started().await;

    runtime.timeout(10, &target, "tick").expect("Delay in range");
    runtime.advance(10);
    events.expect_silence(Duration::from_millis(100)).await;

    runtime.advance(1);
    let request = events.expect_message::<&str>().await;
    assert_eq!(request.message, "tick");
    assert_eq!(request.sender.as_ref(), Some(&target));
}

#[tokio::test]
async fn timer_rejects_delays_beyond_the_wheel() {
    let runtime = manual_runtime();
    let (probe, _events) = Probe::new();
    let target = runtime.new_service(probe).expect("Failed to create service");

    let err = runtime
        .timeout(MAX_DELAY + 1, &target, "never")
        .expect_err("Delay out of range");
    assert!(matches!(err, RuntimeError::DelayOutOfRange(_)));
}
