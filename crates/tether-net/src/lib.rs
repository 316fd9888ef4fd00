//! Networking module for Tether.
//!
//! This crate provides an event-driven TCP client for applications built on a
//! [`tether_core::RunLoop`]:
//!
//! - **Streams**: the readable/writable pair a connection is made of, and the
//!   events they report
//! - **TCP Client**: connect with a deadline, buffered sends, coalesced reads
//! - **Mocks**: scripted stream pairs for deterministic tests, behind the
//!   `mock` feature
//!
//! # Driving a client
//!
//! A [`TcpClient`] never blocks. Its streams post [`StreamEvent`]s to the run
//! loop, and the thread that owns the loop feeds every dispatched event back
//! into [`TcpClient::handle_event`]:
//!
//! ```ignore
//! loop {
//!     run_loop.run_once(Duration::from_millis(50), |event| client.handle_event(event));
//! }
//! ```
//!
//! Connection outcomes are reported exactly once per attempt through the
//! connect callback, either `None` on success or a [`SocketError`].

mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod stream;
pub mod tcp;

pub use error::{NetworkError, Result, SocketError};

// Re-export commonly used types at the crate root
pub use stream::{
    ReadableStream, StreamEvent, StreamEventKind, StreamFactory, StreamObserver, StreamPair,
    StreamSource, WritableStream,
};
pub use tcp::{TcpClient, TcpClientConfig, TcpConnectionState, TcpSocketConfig, TcpStreamFactory};
