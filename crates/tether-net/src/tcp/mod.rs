//! TCP client with callback-based event delivery.
//!
//! This module provides:
//! - **TcpClient**: a single-connection client that reports through callbacks
//! - **TcpStreamFactory**: stream pairs backed by real sockets
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tether_core::RunLoop;
//! use tether_net::tcp::{TcpClient, TcpStreamFactory};
//!
//! let run_loop = RunLoop::new();
//! let mut client = TcpClient::new(run_loop.handle(), TcpStreamFactory::default())
//!     .with_on_connect(|client, error| match error {
//!         None => client.send(b"ping"),
//!         Some(error) => eprintln!("connect failed: {error}"),
//!     })
//!     .with_on_read(|_, data| println!("received {} bytes", data.len()));
//!
//! client.connect("127.0.0.1", 7000, Duration::from_secs(5));
//! run_loop.run_until(
//!     &mut client,
//!     Duration::from_secs(10),
//!     |client, event| client.handle_event(event),
//!     |client| !client.is_connected(),
//! );
//! ```

mod client;
mod config;
mod state;
mod stream;

pub use client::{ConnectHandler, ReadHandler, TcpClient};
pub use config::{TcpClientConfig, TcpSocketConfig};
pub use state::TcpConnectionState;
pub use stream::{TcpReadStream, TcpStreamFactory, TcpWriteStream};
