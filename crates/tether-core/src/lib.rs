//! Core systems for Tether.
//!
//! This crate provides the host-side machinery that Tether's event-driven
//! components run on:
//!
//! - **Run Loop**: a single-threaded event queue fed from any thread
//! - **Timers**: cancellable one-shot deadlines delivered as loop events
//! - **Scheduler**: the capability trait components use to arm timers
//! - **Clocks**: the system clock, or a manual clock for deterministic tests
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tether_core::{LoopEvent, ManualClock, RunLoop, Scheduler};
//!
//! let clock = ManualClock::new();
//! let run_loop: RunLoop<u8> = RunLoop::with_clock(clock.clone());
//! let handle = run_loop.handle();
//!
//! let deadline = handle.schedule_once(Duration::from_secs(5));
//! clock.advance(Duration::from_secs(5));
//!
//! run_loop.run_pending(|event| match event {
//!     LoopEvent::Timer { id } => assert_eq!(id, deadline),
//!     LoopEvent::Source(_) => {}
//! });
//! ```

mod clock;
mod error;
mod event;
pub mod logging;
mod run_loop;
mod scheduler;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result, TimerError};
pub use event::LoopEvent;
pub use run_loop::{LoopHandle, RunLoop};
pub use scheduler::Scheduler;
pub use timer::{TimerId, TimerManager};
