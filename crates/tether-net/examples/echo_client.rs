//! Echo client example demonstrating the TcpClient API.
//!
//! Sends one line to an echo server and prints the reply.
//!
//! Run with: cargo run -p tether-net --example echo_client -- 127.0.0.1 7000 "hello"
//!
//! Set `RUST_LOG=tether_net=trace` to watch the stream events.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tether_core::RunLoop;
use tether_net::{TcpClient, TcpSocketConfig, TcpStreamFactory};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = args
        .next()
        .and_then(|port| port.parse().ok())
        .unwrap_or(7000);
    let message = args.next().unwrap_or_else(|| "hello".to_owned());

    let finished = Rc::new(Cell::new(false));
    let run_loop = RunLoop::new();
    let factory = TcpStreamFactory::new(TcpSocketConfig::new().no_delay(true));

    let mut client = TcpClient::new(run_loop.handle(), factory)
        .with_on_connect({
            let finished = Rc::clone(&finished);
            move |client, error| match error {
                None => {
                    tracing::info!(address = ?client.address(), "connected");
                    client.send(format!("{message}\n"));
                }
                Some(error) => {
                    tracing::error!(%error, "connection failed");
                    finished.set(true);
                }
            }
        })
        .with_on_read({
            let finished = Rc::clone(&finished);
            move |client, data| {
                println!("{}", String::from_utf8_lossy(&data).trim_end());
                client.disconnect();
                finished.set(true);
            }
        })
        .with_on_disconnect({
            let finished = Rc::clone(&finished);
            move |_, _| {
                tracing::info!("server closed the connection");
                finished.set(true);
            }
        });

    client.connect(&host, port, Duration::from_secs(5));
    let completed = run_loop.run_until(
        &mut client,
        Duration::from_secs(30),
        |client, event| client.handle_event(event),
        |_| finished.get(),
    );
    if !completed {
        tracing::warn!("gave up waiting for a reply");
    }
}
