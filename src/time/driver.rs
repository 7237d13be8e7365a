use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Wall-clock tick counter shared by the drivers and the wheel producers.
///
/// Producers stamp adds with [`TickClock::now`], so an add made while a
/// driver is asleep counts from the tick it happened at, not from the tick
/// the driver last delivered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TickClock {
    start: Instant,
    tick_nanos: u128,
}

impl TickClock {
    pub(crate) fn new(tick: Duration) -> Self {
        Self {
            start: Instant::now(),
            tick_nanos: tick.as_nanos().max(1),
        }
    }

    /// Whole ticks elapsed since the clock was created.
    pub(crate) fn now(&self) -> u64 {
        self.ticks_at(Instant::now())
    }

    pub(crate) fn ticks_at(&self, at: Instant) -> u64 {
        (at.saturating_duration_since(self.start).as_nanos() / self.tick_nanos) as u64
    }
}

/// Background thread that turns wall-clock time into whole ticks.
///
/// Each wake-up hands the number of ticks elapsed since the previous one to
/// `advance`. Ticks are read from a shared [`TickClock`], so a late wake-up
/// catches up instead of drifting. Returning `false` from `advance` ends the
/// thread.
pub(crate) struct WheelDriver {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WheelDriver {
    pub(crate) fn spawn<F>(
        name: &str,
        clock: TickClock,
        tick: Duration,
        mut advance: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            // The wheel was created together with the clock, at tick 0.
            let mut delivered = 0;
            while !flag.load(Ordering::Acquire) {
                thread::sleep(tick);
                let now = clock.now();
                if now <= delivered {
                    continue;
                }
                let ticks = now - delivered;
                delivered = now;
                if !advance(ticks) {
                    break;
                }
            }
        })?;
        debug!(driver = name, tick_ms = tick.as_millis() as u64, "Wheel driver started");
        Ok(Self {
            name: name.to_string(),
            stop,
            thread: Some(thread),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(driver = %self.name, "Wheel driver panicked");
            }
        }
    }
}

impl Drop for WheelDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
