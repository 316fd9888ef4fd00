//! Event types delivered by the run loop.

use crate::timer::TimerId;

/// An event dispatched by a [`crate::RunLoop`].
///
/// `E` is the vocabulary of the event sources attached to the loop, such as
/// stream notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent<E> {
    /// A one-shot timer has fired.
    Timer {
        /// The timer that fired.
        id: TimerId,
    },

    /// An event posted by an event source through a [`crate::LoopHandle`].
    Source(E),
}

impl<E> LoopEvent<E> {
    /// The timer that fired, if this is a timer event.
    pub fn timer_id(&self) -> Option<TimerId> {
        match self {
            Self::Timer { id } => Some(*id),
            Self::Source(_) => None,
        }
    }
}
