//! Logging facilities for Tether.
//!
//! Tether uses the `tracing` crate for instrumentation. Libraries in this
//! workspace never install a subscriber; to see logs, install one in your
//! application:
//!
//! ```ignore
//! use tracing_subscriber::EnvFilter;
//!
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter(EnvFilter::new("tether_net=debug,tether_core=trace"))
//!         .init();
//!
//!     // Your application code...
//! }
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "tether_core";
    /// Run loop target.
    pub const RUN_LOOP: &str = "tether_core::run_loop";
    /// Timer system target.
    pub const TIMER: &str = "tether_core::timer";
    /// TCP client state machine target.
    pub const TCP: &str = "tether_net::tcp";
    /// Stream transports target.
    pub const STREAM: &str = "tether_net::stream";
}
