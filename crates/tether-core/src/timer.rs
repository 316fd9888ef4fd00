//! One-shot timers for the run loop.
//!
//! Timers are plain deadlines. Firing a timer does not run any code; the run
//! loop turns each expired [`TimerId`] into a [`crate::LoopEvent::Timer`] and
//! hands it to the dispatcher, which decides what the timer meant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::TimerError;
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// Internal timer data.
#[derive(Debug)]
struct TimerData {
    /// When this timer should fire. `None` if the deadline is beyond what
    /// `Instant` can represent, in which case it never fires.
    deadline: Option<Instant>,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// Manages the pending one-shot timers of a run loop.
///
/// All methods take the current instant explicitly so the caller controls
/// the time source.
#[derive(Debug)]
pub struct TimerManager {
    /// All pending timers. A timer is removed when it fires or is stopped.
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending timer fires (min-heap by fire time).
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerManager {
    /// Create a new timer manager.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Start a one-shot timer that fires `delay` after `now`.
    ///
    /// A delay too large to represent as an `Instant` yields a timer that
    /// stays pending until stopped. Returns the timer ID that can be used to
    /// cancel the timer.
    pub fn start_one_shot(&mut self, now: Instant, delay: Duration) -> TimerId {
        let deadline = now.checked_add(delay);
        let id = self.timers.insert(TimerData { deadline });
        match deadline {
            Some(fire_time) => {
                self.queue.push(TimerQueueEntry { id, fire_time });
                tracing::trace!(target: targets::TIMER, ?id, ?delay, "timer armed");
            }
            None => {
                tracing::trace!(target: targets::TIMER, ?id, ?delay, "timer armed without a reachable deadline");
            }
        }
        id
    }

    /// The instant a pending timer fires at.
    ///
    /// `None` if the timer is not pending or never fires.
    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.timers.get(id).and_then(|timer| timer.deadline)
    }

    /// Stop and remove a timer.
    ///
    /// Fails with [`TimerError::InvalidTimerId`] if the timer already fired or
    /// was stopped before.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        match self.timers.remove(id) {
            Some(_) => {
                tracing::trace!(target: targets::TIMER, ?id, "timer stopped");
                Ok(())
            }
            None => Err(TimerError::InvalidTimerId),
        }
    }

    /// Check if a timer is still pending.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Get the duration from `now` until the next timer fires, if any.
    ///
    /// Returns `None` if there are no pending timers.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        self.discard_stale();
        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(now))
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn process_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired = Vec::new();

        while let Some(entry) = self.queue.peek().copied() {
            if entry.fire_time > now {
                break;
            }
            self.queue.pop();

            // Stopped timers leave their heap entry behind.
            if self.timers.remove(entry.id).is_none() {
                continue;
            }

            tracing::trace!(target: targets::TIMER, id = ?entry.id, "timer fired");
            fired.push(entry.id);
        }

        fired
    }

    /// Get the number of pending timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe wrapper around `TimerManager`, shared by a run loop and its
/// handles.
#[derive(Debug, Default)]
pub(crate) struct SharedTimerManager {
    inner: Mutex<TimerManager>,
}

impl SharedTimerManager {
    pub fn start_one_shot(&self, now: Instant, delay: Duration) -> TimerId {
        self.inner.lock().start_one_shot(now, delay)
    }

    pub fn stop(&self, id: TimerId) -> Result<(), TimerError> {
        self.inner.lock().stop(id)
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.inner.lock().is_active(id)
    }

    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.inner.lock().time_until_next(now)
    }

    pub fn process_expired(&self, now: Instant) -> Vec<TimerId> {
        self.inner.lock().process_expired(now)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_fires_once_at_deadline() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        let id = timers.start_one_shot(start, Duration::from_secs(2));

        assert!(timers.is_active(id));
        assert!(timers.process_expired(start + Duration::from_secs(1)).is_empty());

        let fired = timers.process_expired(start + Duration::from_secs(2));
        assert_eq!(fired, vec![id]);
        assert!(!timers.is_active(id));

        assert!(timers.process_expired(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_stopped_timer_never_fires() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        let id = timers.start_one_shot(start, Duration::from_millis(10));

        assert!(timers.stop(id).is_ok());
        assert_eq!(timers.stop(id), Err(TimerError::InvalidTimerId));
        assert!(timers.process_expired(start + Duration::from_secs(1)).is_empty());
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_expired_timers_come_out_in_deadline_order() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        let late = timers.start_one_shot(start, Duration::from_millis(30));
        let early = timers.start_one_shot(start, Duration::from_millis(10));

        let fired = timers.process_expired(start + Duration::from_millis(50));
        assert_eq!(fired, vec![early, late]);
    }

    #[test]
    fn test_time_until_next_skips_stopped_timers() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        assert_eq!(timers.time_until_next(start), None);

        let first = timers.start_one_shot(start, Duration::from_millis(10));
        timers.start_one_shot(start, Duration::from_millis(40));
        timers.stop(first).unwrap();

        assert_eq!(
            timers.time_until_next(start),
            Some(Duration::from_millis(40))
        );
        assert_eq!(
            timers.time_until_next(start + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_unrepresentable_deadline_never_fires() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        let forever = timers.start_one_shot(start, Duration::MAX);
        let soon = timers.start_one_shot(start, Duration::from_secs(1));

        assert!(timers.is_active(forever));
        assert_eq!(timers.deadline(forever), None);
        assert_eq!(timers.deadline(soon), Some(start + Duration::from_secs(1)));
        assert_eq!(timers.time_until_next(start), Some(Duration::from_secs(1)));

        let later = start + Duration::from_secs(365 * 24 * 60 * 60);
        assert_eq!(timers.process_expired(later), vec![soon]);
        assert!(timers.is_active(forever));
        assert_eq!(timers.time_until_next(later), None);

        assert!(timers.stop(forever).is_ok());
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_zero_delay_fires_immediately() {
        let mut timers = TimerManager::new();
        let start = Instant::now();
        let id = timers.start_one_shot(start, Duration::ZERO);
        assert_eq!(timers.process_expired(start), vec![id]);
    }
}
