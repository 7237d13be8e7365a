use super::driver::TickClock;
use super::wheel::TimeWheel;
use crate::error::Result;
use crate::message::Message;
use crate::service::ServiceHandle;

/// Application-scheduled delayed delivery.
pub(crate) struct Timer {
    wheel: TimeWheel<(ServiceHandle, Message)>,
    clock: Option<TickClock>,
}

impl Timer {
    pub(crate) fn new(clock: Option<TickClock>) -> Self {
        Self {
            wheel: TimeWheel::new(),
            clock,
        }
    }

    pub(crate) fn schedule(&self, ticks: u64, target: &ServiceHandle, message: Message) -> Result<()> {
        let entry = (target.clone(), message);
        match self.clock {
            Some(clock) => self.wheel.add_at(clock.now(), ticks, entry),
            None => self.wheel.add(ticks, entry),
        }
    }

    pub(crate) fn expire(&self, elapsed: u64) -> Vec<(ServiceHandle, Message)> {
        self.wheel.tick(elapsed)
    }

    pub(crate) fn pending(&self) -> usize {
        self.wheel.len()
    }
}
