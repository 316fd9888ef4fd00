//! A single-threaded run loop.
//!
//! Event sources (possibly living on other threads) post events through a
//! [`LoopHandle`]; the thread that owns the [`RunLoop`] drains them one at a
//! time, in posting order, and interleaves expired timers. Dispatch happens
//! synchronously on the owning thread, so handlers never run concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, TimerError};
use crate::event::LoopEvent;
use crate::logging::targets;
use crate::scheduler::Scheduler;
use crate::timer::{SharedTimerManager, TimerId};

/// The event queue and timer set for one thread of control.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_core::{LoopEvent, ManualClock, RunLoop, Scheduler};
///
/// let clock = ManualClock::new();
/// let run_loop: RunLoop<&'static str> = RunLoop::with_clock(clock.clone());
/// let handle = run_loop.handle();
///
/// let timer = handle.schedule_once(Duration::from_secs(1));
/// handle.post("hello").unwrap();
///
/// let mut seen = Vec::new();
/// run_loop.run_pending(|event| seen.push(event));
/// assert_eq!(seen, vec![LoopEvent::Source("hello")]);
///
/// clock.advance(Duration::from_secs(1));
/// run_loop.run_pending(|event| seen.push(event));
/// assert_eq!(seen.last(), Some(&LoopEvent::Timer { id: timer }));
/// ```
pub struct RunLoop<E> {
    sender: Sender<LoopEvent<E>>,
    receiver: Receiver<LoopEvent<E>>,
    timers: Arc<SharedTimerManager>,
    clock: Arc<dyn Clock>,
}

impl<E> RunLoop<E> {
    /// Create a run loop driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a run loop whose timers are measured against `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            timers: Arc::new(SharedTimerManager::default()),
            clock: Arc::new(clock),
        }
    }

    /// Get a handle for posting events and scheduling timers on this loop.
    pub fn handle(&self) -> LoopHandle<E> {
        LoopHandle {
            sender: self.sender.clone(),
            timers: self.timers.clone(),
            clock: self.clock.clone(),
        }
    }

    /// The number of posted events waiting to be dispatched.
    pub fn queued_events(&self) -> usize {
        self.receiver.len()
    }

    /// The number of armed timers.
    pub fn active_timers(&self) -> usize {
        self.timers.active_count()
    }

    /// Dispatch everything that is ready now without blocking.
    ///
    /// Queued events go first, in posting order, followed by any timers whose
    /// deadline has passed. Events posted by `dispatch` itself are picked up
    /// in the same call. Returns the number of events dispatched.
    pub fn run_pending<F>(&self, mut dispatch: F) -> usize
    where
        F: FnMut(LoopEvent<E>),
    {
        let mut dispatched = 0;

        loop {
            let before = dispatched;

            while let Ok(event) = self.receiver.try_recv() {
                tracing::trace!(target: targets::RUN_LOOP, "dispatching posted event");
                dispatch(event);
                dispatched += 1;
            }

            // The timer lock is released before any handler runs.
            let expired = self.timers.process_expired(self.clock.now());
            for id in expired {
                tracing::trace!(target: targets::RUN_LOOP, ?id, "dispatching timer");
                dispatch(LoopEvent::Timer { id });
                dispatched += 1;
            }

            if dispatched == before {
                return dispatched;
            }
        }
    }

    /// Wait for work for at most `max_wait`, then dispatch everything ready.
    ///
    /// The wait is cut short by a posted event or by the next timer deadline.
    /// Returns the number of events dispatched.
    pub fn run_once<F>(&self, max_wait: Duration, mut dispatch: F) -> usize
    where
        F: FnMut(LoopEvent<E>),
    {
        let wait = self
            .timers
            .time_until_next(self.clock.now())
            .map_or(max_wait, |until_timer| until_timer.min(max_wait));

        let mut dispatched = 0;
        match self.receiver.recv_timeout(wait) {
            Ok(event) => {
                dispatch(event);
                dispatched += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            // The loop holds a sender itself, so this cannot happen while
            // `self` is alive.
            Err(RecvTimeoutError::Disconnected) => return dispatched,
        }

        dispatched + self.run_pending(dispatch)
    }

    /// Drive `state` until `done` reports true or `timeout` elapses.
    ///
    /// `timeout` is measured in real time, whatever clock the timers use.
    /// Returns whether `done` was satisfied.
    pub fn run_until<S, F, P>(
        &self,
        state: &mut S,
        timeout: Duration,
        mut dispatch: F,
        mut done: P,
    ) -> bool
    where
        F: FnMut(&mut S, LoopEvent<E>),
        P: FnMut(&S) -> bool,
    {
        // `None` when `timeout` reaches past what `Instant` can represent.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if done(state) {
                return true;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                return false;
            }
            self.run_once(remaining, |event| dispatch(state, event));
        }
    }
}

impl<E> Default for RunLoop<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for RunLoop<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("queued_events", &self.queued_events())
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

/// A cloneable, thread-safe handle to a [`RunLoop`].
pub struct LoopHandle<E> {
    sender: Sender<LoopEvent<E>>,
    timers: Arc<SharedTimerManager>,
    clock: Arc<dyn Clock>,
}

impl<E> LoopHandle<E> {
    /// Post an event to be dispatched on the loop's thread.
    ///
    /// Fails with [`CoreError::EventLoopExited`] once the run loop is gone.
    pub fn post(&self, event: E) -> Result<()> {
        self.sender
            .send(LoopEvent::Source(event))
            .map_err(|_| CoreError::EventLoopExited)
    }
}

impl<E> Scheduler for LoopHandle<E> {
    fn schedule_once(&self, delay: Duration) -> TimerId {
        self.timers.start_one_shot(self.clock.now(), delay)
    }

    fn cancel(&self, id: TimerId) -> std::result::Result<(), TimerError> {
        self.timers.stop(id)
    }

    fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.is_active(id)
    }
}

impl<E> Clone for LoopHandle<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            timers: self.timers.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<E> std::fmt::Debug for LoopHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("active_timers", &self.timers.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_posted_events_dispatch_in_order() {
        let run_loop: RunLoop<u32> = RunLoop::new();
        let handle = run_loop.handle();
        for n in 0..3 {
            handle.post(n).unwrap();
        }

        let mut seen = Vec::new();
        assert_eq!(run_loop.run_pending(|event| seen.push(event)), 3);
        assert_eq!(
            seen,
            vec![
                LoopEvent::Source(0),
                LoopEvent::Source(1),
                LoopEvent::Source(2)
            ]
        );
        assert_eq!(run_loop.run_pending(|_| panic!("nothing queued")), 0);
    }

    #[test]
    fn test_timer_waits_for_clock() {
        let clock = ManualClock::new();
        let run_loop: RunLoop<()> = RunLoop::with_clock(clock.clone());
        let handle = run_loop.handle();
        let id = handle.schedule_once(Duration::from_secs(2));

        let mut fired = Vec::new();
        run_loop.run_pending(|event| fired.extend(event.timer_id()));
        assert!(fired.is_empty());

        clock.advance(Duration::from_secs(2));
        run_loop.run_pending(|event| fired.extend(event.timer_id()));
        assert_eq!(fired, vec![id]);
        assert!(!handle.is_scheduled(id));
    }

    #[test]
    fn test_cancelled_timer_is_not_dispatched() {
        let clock = ManualClock::new();
        let run_loop: RunLoop<()> = RunLoop::with_clock(clock.clone());
        let handle = run_loop.handle();
        let id = handle.schedule_once(Duration::from_millis(10));

        assert!(handle.cancel(id).is_ok());
        assert_eq!(handle.cancel(id), Err(TimerError::InvalidTimerId));

        clock.advance(Duration::from_secs(1));
        assert_eq!(run_loop.run_pending(|_| panic!("timer was cancelled")), 0);
    }

    #[test]
    fn test_events_posted_during_dispatch_are_delivered() {
        let run_loop: RunLoop<u32> = RunLoop::new();
        let handle = run_loop.handle();
        handle.post(1).unwrap();

        let mut seen = Vec::new();
        run_loop.run_pending(|event| {
            if let LoopEvent::Source(n) = event {
                seen.push(n);
                if n < 3 {
                    handle.post(n + 1).unwrap();
                }
            }
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_dispatch_may_schedule_timers() {
        let clock = ManualClock::new();
        let run_loop: RunLoop<()> = RunLoop::with_clock(clock.clone());
        let handle = run_loop.handle();
        handle.post(()).unwrap();

        let mut armed = None;
        run_loop.run_pending(|_| {
            armed = Some(handle.schedule_once(Duration::ZERO));
        });

        // A zero-delay timer armed during dispatch fires in the same pass.
        assert!(armed.is_some());
        assert_eq!(run_loop.active_timers(), 0);
    }

    #[test]
    fn test_run_once_wakes_on_cross_thread_post() {
        let run_loop: RunLoop<&'static str> = RunLoop::new();
        let handle = run_loop.handle();

        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.post("ping").unwrap();
        });

        let mut seen = Vec::new();
        let mut waited = 0;
        while seen.is_empty() && waited < 100 {
            run_loop.run_once(Duration::from_millis(50), |event| seen.push(event));
            waited += 1;
        }
        poster.join().unwrap();
        assert_eq!(seen, vec![LoopEvent::Source("ping")]);
    }

    #[test]
    fn test_run_until_reports_timeout() {
        let run_loop: RunLoop<()> = RunLoop::new();
        let mut count = 0u32;
        let satisfied = run_loop.run_until(
            &mut count,
            Duration::from_millis(30),
            |count, _| *count += 1,
            |count| *count > 0,
        );
        assert!(!satisfied);
    }

    #[test]
    fn test_run_until_stops_when_done() {
        let run_loop: RunLoop<u32> = RunLoop::new();
        let handle = run_loop.handle();
        handle.post(7).unwrap();

        let mut total = 0u32;
        let satisfied = run_loop.run_until(
            &mut total,
            Duration::from_secs(5),
            |total, event| {
                if let LoopEvent::Source(n) = event {
                    *total += n;
                }
            },
            |total| *total == 7,
        );
        assert!(satisfied);
    }

    #[test]
    fn test_unbounded_waits_do_not_overflow() {
        let clock = ManualClock::new();
        let run_loop: RunLoop<u32> = RunLoop::with_clock(clock.clone());
        let handle = run_loop.handle();
        let forever = handle.schedule_once(Duration::MAX);

        clock.advance(Duration::from_secs(24 * 60 * 60));
        assert_eq!(run_loop.run_pending(|_| panic!("nothing is due")), 0);
        assert!(handle.is_scheduled(forever));

        let poster = run_loop.handle();
        let sender = thread::spawn(move || poster.post(5).unwrap());
        let mut total = 0u32;
        let satisfied = run_loop.run_until(
            &mut total,
            Duration::MAX,
            |total, event| {
                if let LoopEvent::Source(n) = event {
                    *total += n;
                }
            },
            |total| *total == 5,
        );
        sender.join().unwrap();
        assert!(satisfied);
    }

    #[test]
    fn test_post_fails_after_loop_dropped() {
        let run_loop: RunLoop<()> = RunLoop::new();
        let handle = run_loop.handle();
        drop(run_loop);
        assert!(matches!(handle.post(()), Err(CoreError::EventLoopExited)));
    }
}
