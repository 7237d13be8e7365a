//! # Hierarchical Time Wheel
//!
//! Five levels of 64 slots. Level `L` covers bits `[6L, 6L + 6)` of the
//! absolute expiry tick. An entry sits at the highest level where its expiry
//! differs from the wheel's current time. When a level rotates into a slot,
//! that slot cascades: its entries are placed again relative to the new time
//! and end up at a finer level, or fire.
//!
//! Producers never touch the slots. [`TimeWheel::add`] appends to a pending
//! buffer under a short lock, and the next [`TimeWheel::tick`] drains it
//! before advancing. Expired payloads come back as a `Vec`, so callers deliver
//! them after every wheel lock has been released.
//!
//! An entry added with delay `D` fires on the `(D + 1)`-th tick after it was
//! added. Because the add happens somewhere between two ticks, the elapsed
//! time is more than `D` and at most `D + 1` ticks.
//!
//! [`TimeWheel::add`] counts from the wheel's time when the add is drained.
//! That is exact when every `tick` call covers one tick, or when adds happen
//! strictly before the advance, as with a manual clock. A wall-clock driver
//! that wakes late and catches up several ticks at once uses
//! [`TimeWheel::add_at`] instead, passing the tick the add really happened
//! at, so nothing fires early.

use crate::error::{Result, RuntimeError};
use parking_lot::Mutex;
use std::mem;

const SLOT_BITS: u32 = 6;
const SLOTS: usize = 1 << SLOT_BITS;
const SLOT_MASK: u64 = (SLOTS as u64) - 1;
const LEVELS: usize = 5;
const RANGE_BITS: u32 = SLOT_BITS * LEVELS as u32;

/// Largest delay, in ticks, accepted by [`TimeWheel::add`].
pub const MAX_DELAY: u64 = (1 << RANGE_BITS) - 1;

struct Entry<T> {
    expires_at: u64,
    payload: T,
}

struct Levels<T> {
    slots: Vec<Vec<Entry<T>>>,
    now: u64,
    len: usize,
}

impl<T> Levels<T> {
    fn new() -> Self {
        Self {
            slots: (0..SLOTS * LEVELS).map(|_| Vec::new()).collect(),
            now: 0,
            len: 0,
        }
    }

    fn level_for(now: u64, expires_at: u64) -> usize {
        let masked = ((now ^ expires_at) | SLOT_MASK).min((1 << RANGE_BITS) - 1);
        let significant = 63 - masked.leading_zeros();
        (significant / SLOT_BITS) as usize
    }

    fn slot_index(level: usize, at: u64) -> usize {
        let slot = (at >> (SLOT_BITS as usize * level)) & SLOT_MASK;
        level * SLOTS + slot as usize
    }

    fn insert(&mut self, entry: Entry<T>) {
        let level = Self::level_for(self.now, entry.expires_at);
        let index = Self::slot_index(level, entry.expires_at);
        self.slots[index].push(entry);
    }

    /// Moves time forward one tick and collects what expires at it.
    fn step(&mut self, expired: &mut Vec<T>) {
        self.now += 1;
        let now = self.now;

        for level in (1..LEVELS).rev() {
            let span_mask = (1u64 << (SLOT_BITS as usize * level)) - 1;
            if now & span_mask != 0 {
                continue;
            }
            let index = Self::slot_index(level, now);
            for entry in mem::take(&mut self.slots[index]) {
                self.insert(entry);
            }
        }

        let index = Self::slot_index(0, now);
        for entry in mem::take(&mut self.slots[index]) {
            debug_assert_eq!(entry.expires_at, now);
            self.len -= 1;
            expired.push(entry.payload);
        }
    }
}

struct PendingAdd<T> {
    /// Tick the delay counts from. `None` means the wheel's time at drain.
    base: Option<u64>,
    delay: u64,
    payload: T,
}

/// Tick-driven delay queue for payloads of type `T`.
pub struct TimeWheel<T> {
    pending: Mutex<Vec<PendingAdd<T>>>,
    levels: Mutex<Levels<T>>,
}

impl<T> TimeWheel<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            levels: Mutex::new(Levels::new()),
        }
    }

    /// Schedules `payload` to come back from [`tick`](Self::tick) after `delay` ticks.
    pub fn add(&self, delay: u64, payload: T) -> Result<()> {
        self.push(None, delay, payload)
    }

    /// Like [`add`](Self::add), but counts `delay` from tick `base`. A base
    /// behind the wheel's time counts from the wheel's time instead.
    pub fn add_at(&self, base: u64, delay: u64, payload: T) -> Result<()> {
        self.push(Some(base), delay, payload)
    }

    fn push(&self, base: Option<u64>, delay: u64, payload: T) -> Result<()> {
        if delay > MAX_DELAY {
            return Err(RuntimeError::DelayOutOfRange(delay));
        }
        self.pending.lock().push(PendingAdd {
            base,
            delay,
            payload,
        });
        Ok(())
    }

    /// Drains pending adds, then advances `elapsed` ticks and returns every
    /// payload that expired, earliest first.
    pub fn tick(&self, elapsed: u64) -> Vec<T> {
        let pending = mem::take(&mut *self.pending.lock());
        let mut levels = self.levels.lock();

        for PendingAdd {
            base,
            delay,
            payload,
        } in pending
        {
            let from = base.map_or(levels.now, |base| base.max(levels.now));
            let expires_at = from + delay + 1;
            levels.len += 1;
            levels.insert(Entry {
                expires_at,
                payload,
            });
        }

        let mut expired = Vec::new();
        let target = levels.now + elapsed;
        while levels.now < target {
            if levels.len == 0 {
                levels.now = target;
                break;
            }
            levels.step(&mut expired);
        }
        expired
    }

    /// Ticks processed so far.
    pub fn now(&self) -> u64 {
        self.levels.lock().now
    }

    /// Entries scheduled, including adds not yet drained.
    pub fn len(&self) -> usize {
        self.levels.lock().len + self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TimeWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ticks one at a time until `id` fires; returns how many ticks that took.
    fn ticks_until_fired(wheel: &TimeWheel<u32>, id: u32, limit: u64) -> Option<u64> {
        for n in 1..=limit {
            if wheel.tick(1).contains(&id) {
                return Some(n);
            }
        }
        None
    }

    #[test]
    fn zero_delay_fires_on_next_tick() {
        let wheel = TimeWheel::new();
        wheel.add(0, 1).unwrap();
        assert_eq!(wheel.tick(1), vec![1]);
        assert!(wheel.is_empty());
    }

    #[test]
    fn short_delay_fires_after_delay_plus_one_ticks() {
        let wheel = TimeWheel::new();
        wheel.add(10, 1).unwrap();
        assert_eq!(ticks_until_fired(&wheel, 1, 100), Some(11));
    }

    #[test]
    fn cascading_delay_is_exact() {
        let wheel = TimeWheel::new();
        wheel.add(5000, 9).unwrap();
        assert!(wheel.tick(5000).is_empty());
        assert_eq!(wheel.len(), 1);
        assert_eq!(wheel.tick(1), vec![9]);
        assert_eq!(wheel.now(), 5001);
    }

    #[test]
    fn delays_across_every_level_fire_on_time() {
        let delays = [1, 63, 64, 65, 4095, 4096, 4097, 262_143, 262_144, 300_000];
        let wheel = TimeWheel::new();
        // Start from an unaligned time so cascades cross slot boundaries.
        wheel.add(36, u32::MAX).unwrap();
        wheel.tick(37);

        for (i, delay) in delays.iter().enumerate() {
            wheel.add(*delay, i as u32).unwrap();
        }
        let start = wheel.now();
        let mut fired_at = vec![0u64; delays.len()];
        while wheel.now() < start + 300_001 {
            for id in wheel.tick(1) {
                fired_at[id as usize] = wheel.now() - start;
            }
        }
        for (i, delay) in delays.iter().enumerate() {
            assert_eq!(fired_at[i], delay + 1, "delay {delay}");
        }
    }

    #[test]
    fn entries_added_later_are_relative_to_current_time() {
        let wheel = TimeWheel::new();
        wheel.tick(100);
        wheel.add(70, 2).unwrap();
        assert!(wheel.tick(70).is_empty());
        assert_eq!(wheel.tick(1), vec![2]);
    }

    #[test]
    fn batch_tick_returns_in_expiry_order() {
        let wheel = TimeWheel::new();
        wheel.add(200, 3).unwrap();
        wheel.add(5, 1).unwrap();
        wheel.add(70, 2).unwrap();
        assert_eq!(wheel.tick(1_000), vec![1, 2, 3]);
    }

    #[test]
    fn idle_wheel_jumps_forward() {
        let wheel: TimeWheel<u32> = TimeWheel::new();
        assert!(wheel.tick(1 << 40).is_empty());
        assert_eq!(wheel.now(), 1 << 40);
        wheel.add(3, 4).unwrap();
        assert_eq!(wheel.tick(4), vec![4]);
    }

    #[test]
    fn maximum_delay_is_accepted_and_larger_is_rejected() {
        let wheel = TimeWheel::new();
        wheel.tick(12_345);
        wheel.add(MAX_DELAY, 1).unwrap();
        assert!(matches!(
            wheel.add(MAX_DELAY + 1, 2),
            Err(RuntimeError::DelayOutOfRange(_))
        ));
        assert!(wheel.tick(1).is_empty());
        assert_eq!(wheel.len(), 1);
    }

    #[test]
    fn late_driver_does_not_fire_early() {
        let wheel = TimeWheel::new();
        // The wall clock reached tick 3 before the driver woke up.
        wheel.add_at(3, 2, 1).unwrap();
        wheel.add(2, 2).unwrap();
        // Counting from the wheel's own time, entry 2 is already due.
        assert_eq!(wheel.tick(4), vec![2]);
        assert!(wheel.tick(1).is_empty());
        assert_eq!(wheel.tick(1), vec![1]);
        assert_eq!(wheel.now(), 6);
    }

    #[test]
    fn stale_base_counts_from_wheel_time() {
        let wheel = TimeWheel::new();
        wheel.tick(10);
        wheel.add_at(4, 3, 1).unwrap();
        assert!(wheel.tick(3).is_empty());
        assert_eq!(wheel.tick(1), vec![1]);
    }

    #[test]
    fn level_tracks_highest_differing_group() {
        assert_eq!(Levels::<()>::level_for(0, 1), 0);
        assert_eq!(Levels::<()>::level_for(0, 63), 0);
        assert_eq!(Levels::<()>::level_for(0, 64), 1);
        assert_eq!(Levels::<()>::level_for(60, 70), 1);
        assert_eq!(Levels::<()>::level_for(0, 4096), 2);
        assert_eq!(Levels::<()>::level_for(0, 1 << 24), 4);
        assert_eq!(Levels::<()>::level_for(5, 5 + (1 << 30)), 4);
    }
}
