//! The scheduling capability handed to event-driven components.
//!
//! Components that need a deadline (a connection timeout, say) take a
//! [`Scheduler`] instead of reaching for a global run loop. The run loop's
//! [`crate::LoopHandle`] is the production implementation; a loop built on a
//! [`crate::ManualClock`] gives tests full control over when timers fire.

use std::time::Duration;

use crate::error::TimerError;
use crate::timer::TimerId;

/// Arms and cancels one-shot timers on some run loop.
///
/// A fired timer is delivered to the loop's dispatcher as
/// [`crate::LoopEvent::Timer`] carrying the ID returned here.
pub trait Scheduler {
    /// Schedule a one-shot timer that fires after `delay`.
    fn schedule_once(&self, delay: Duration) -> TimerId;

    /// Cancel a pending timer.
    ///
    /// Fails with [`TimerError::InvalidTimerId`] if the timer already fired or
    /// was cancelled before.
    fn cancel(&self, id: TimerId) -> Result<(), TimerError>;

    /// Check whether a timer is still pending.
    fn is_scheduled(&self, id: TimerId) -> bool;
}
