//! Error types for Tether core.

use std::fmt;

/// The main error type for Tether core operations.
#[derive(Debug)]
pub enum CoreError {
    /// The run loop that owned the event queue has been dropped.
    EventLoopExited,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventLoopExited => {
                write!(f, "The run loop has already exited")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// Timer-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The timer ID is invalid, has already fired, or was cancelled.
    InvalidTimerId,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimerId => write!(f, "Invalid or expired timer ID"),
        }
    }
}

impl std::error::Error for TimerError {}

/// A specialized Result type for Tether core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
