mod common;

use actor_kernel::{Context, Message, Request, Result, Runtime, Service, ServiceHandle};
use async_trait::async_trait;
use common::{eventually, manual_runtime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Alarm(u64);

/// Subscribes to `Alarm` on init and answers each one with its name.
struct Listener {
    name: &'static str,
    priority: u32,
    seen: Arc<AtomicU64>,
}

#[async_trait]
impl Service for Listener {
    fn on_init(&self, ctx: &Context) -> Result<()> {
        ctx.subscribe::<Alarm>(self.priority);
        Ok(())
    }

    async fn on_msg(self: Arc<Self>, _ctx: Context, req: Request) -> Result<Option<Message>> {
        let Alarm(weight) = req.message.into_typed()?;
        self.seen.fetch_add(weight, Ordering::SeqCst);
        Ok(Some(Message::new(self.name)))
    }
}

/// Calls every `Alarm` subscriber and reports who answered, stopping after
/// the named one.
struct Fanout(Option<&'static str>);

struct Publisher;

#[async_trait]
impl Service for Publisher {
    async fn on_msg(self: Arc<Self>, ctx: Context, req: Request) -> Result<Option<Message>> {
        let Fanout(stop_after) = req.message.into_typed()?;
        let mut heard = Vec::new();
        let called = ctx
            .publish_call(Alarm(1), |reply| match reply.into_typed::<&'static str>() {
                Ok(name) => {
                    heard.push(name);
                    stop_after != Some(name)
                }
                Err(_) => true,
            })
            .await?;
        Ok(Some(Message::new((called, heard))))
    }
}

fn listener(runtime: &Runtime, name: &'static str, priority: u32, seen: &Arc<AtomicU64>) -> ServiceHandle {
    runtime
        .new_service(Listener {
            name,
            priority,
            seen: seen.clone(),
        })
        .expect("Failed to create service")
}

#[tokio::test]
async fn publish_reaches_every_subscriber() {
    let runtime = manual_runtime();
    let seen = Arc::new(AtomicU64::new(0));
    for (name, priority) in [("a", 1), ("b", 2), ("c", 3)] {
        listener(&runtime, name, priority, &seen);
    }
    assert_eq!(runtime.subscriber_count::<Alarm>(), 3);

    assert_eq!(runtime.publish(Alarm(5)), 3);
    assert!(eventually(|| seen.load(Ordering::SeqCst) == 15).await);

    // Nobody listens to other types.
    assert_eq!(runtime.publish(7_u32), 0);
}

#[tokio::test]
async fn calls_follow_priority_then_subscription_order() {
    let runtime = manual_runtime();
    let seen = Arc::new(AtomicU64::new(0));
    listener(&runtime, "low", 1, &seen);
    listener(&runtime, "high", 10, &seen);
    listener(&runtime, "mid-first", 5, &seen);
    listener(&runtime, "mid-second", 5, &seen);
    let publisher = runtime.new_service(Publisher).expect("Failed to create service");
    let port = runtime.port().expect("Failed to create port");

    let (called, heard): (usize, Vec<&'static str>) =
        port.call(&publisher, Fanout(None)).await.expect("Call failed");
    assert_eq!(called, 4);
    assert_eq!(heard, vec!["high", "mid-first", "mid-second", "low"]);
}

#[tokio::test]
async fn reply_handler_can_end_the_fan_out() {
    let runtime = manual_runtime();
    let seen = Arc::new(AtomicU64::new(0));
    listener(&runtime, "low", 1, &seen);
    listener(&runtime, "high", 10, &seen);
    listener(&runtime, "mid", 5, &seen);
    let publisher = runtime.new_service(Publisher).expect("Failed to create service");
    let port = runtime.port().expect("Failed to create port");

    let (called, heard): (usize, Vec<&'static str>) = port
        .call(&publisher, Fanout(Some("mid")))
        .await
        .expect("Call failed");
    assert_eq!(called, 2);
    assert_eq!(heard, vec!["high", "mid"]);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unsubscribed_and_destroyed_services_stop_receiving() {
    let runtime = manual_runtime();
    let seen = Arc::new(AtomicU64::new(0));
    let quitter = listener(&runtime, "quitter", 1, &seen);
    let doomed = listener(&runtime, "doomed", 2, &seen);
    listener(&runtime, "stayer", 3, &seen);

    assert!(runtime.unsubscribe::<Alarm>(&quitter));
    assert!(!runtime.unsubscribe::<Alarm>(&quitter));
    assert_eq!(runtime.subscriber_count::<Alarm>(), 2);

    let before = runtime.service_count();
    runtime.kill_service(&doomed);
    assert!(eventually(|| runtime.service_count() == before - 1).await);
    assert_eq!(runtime.subscriber_count::<Alarm>(), 1);

    assert_eq!(runtime.publish(Alarm(1)), 1);
    assert!(eventually(|| seen.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn subscribing_again_moves_the_priority() {
    let runtime = manual_runtime();
    let seen = Arc::new(AtomicU64::new(0));
    let first = listener(&runtime, "first", 5, &seen);
    listener(&runtime, "second", 3, &seen);
    runtime.subscribe::<Alarm>(&first, 1);
    assert_eq!(runtime.subscriber_count::<Alarm>(), 2);

    let publisher = runtime.new_service(Publisher).expect("Failed to create service");
    let port = runtime.port().expect("Failed to create port");
    let (_, heard): (usize, Vec<&'static str>) =
        port.call(&publisher, Fanout(None)).await.expect("Call failed");
    assert_eq!(heard, vec!["second", "first"]);
}
