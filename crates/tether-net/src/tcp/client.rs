//! TCP client with callback-based event delivery.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tether_core::logging::targets;
use tether_core::{LoopEvent, LoopHandle, Scheduler, TimerId};

use super::config::TcpClientConfig;
use super::state::TcpConnectionState;
use crate::error::SocketError;
use crate::stream::{
    ReadableStream, StreamEvent, StreamEventKind, StreamFactory, StreamObserver, StreamPair,
    StreamSource, WritableStream,
};

/// Callback for connection results and disconnection.
///
/// Receives the client itself so the handler can `send` or `disconnect`.
pub type ConnectHandler = Box<dyn FnMut(&mut TcpClient, Option<SocketError>)>;

/// Callback for received data.
pub type ReadHandler = Box<dyn FnMut(&mut TcpClient, Bytes)>;

/// A single-connection TCP client driven by stream events.
///
/// The client owns a readable/writable stream pair, a connection deadline and
/// two byte queues. It never blocks: [`connect`](Self::connect) and
/// [`send`](Self::send) return immediately, and outcomes arrive through the
/// callbacks when the owning [`tether_core::RunLoop`] dispatches events into
/// [`handle_event`](Self::handle_event).
///
/// # Callbacks
///
/// - `on_connect`: `None` once the streams open, or the failure
///   ([`SocketError::Timeout`] / [`SocketError::Unknown`]). Cleared after a
///   successful connection.
/// - `on_disconnect`: fired with `None` when the peer closes the connection.
/// - `on_read`: all bytes drained by one readability notification.
///
/// # Example
///
/// ```ignore
/// let run_loop = RunLoop::new();
/// let mut client = TcpClient::new(run_loop.handle(), TcpStreamFactory::default())
///     .with_on_connect(|client, error| match error {
///         None => client.send(b"hello"),
///         Some(error) => eprintln!("connect failed: {error}"),
///     })
///     .with_on_read(|_, data| println!("received {} bytes", data.len()));
///
/// client.connect("127.0.0.1", 7000, Duration::from_secs(5));
/// loop {
///     run_loop.run_once(Duration::from_millis(100), |event| client.handle_event(event));
/// }
/// ```
pub struct TcpClient {
    config: TcpClientConfig,
    handle: LoopHandle<StreamEvent>,
    factory: Box<dyn StreamFactory>,
    readable: Option<Box<dyn ReadableStream>>,
    writable: Option<Box<dyn WritableStream>>,
    /// Bumped on every attach. Only events tagged with the current value
    /// belong to the owned pair.
    generation: u64,
    /// Bytes drained from the readable stream, not yet handed to `on_read`.
    read_queue: BytesMut,
    /// Bytes not yet accepted by the writable stream, in send order.
    write_queue: BytesMut,
    read_buffer: Box<[u8]>,
    timeout_timer: Option<TimerId>,
    state: TcpConnectionState,
    address: Option<String>,
    on_connect: Option<ConnectHandler>,
    on_disconnect: Option<ConnectHandler>,
    on_read: Option<ReadHandler>,
}

impl TcpClient {
    /// Create a client with default configuration.
    pub fn new(handle: LoopHandle<StreamEvent>, factory: impl StreamFactory + 'static) -> Self {
        Self::with_config(handle, factory, TcpClientConfig::default())
    }

    /// Create a client with the given configuration.
    pub fn with_config(
        handle: LoopHandle<StreamEvent>,
        factory: impl StreamFactory + 'static,
        config: TcpClientConfig,
    ) -> Self {
        let read_buffer = vec![0u8; config.read_chunk_size].into_boxed_slice();
        Self {
            config,
            handle,
            factory: Box::new(factory),
            readable: None,
            writable: None,
            generation: 0,
            read_queue: BytesMut::new(),
            write_queue: BytesMut::new(),
            read_buffer,
            timeout_timer: None,
            state: TcpConnectionState::Idle,
            address: None,
            on_connect: None,
            on_disconnect: None,
            on_read: None,
        }
    }

    /// Set the connect callback, builder style.
    pub fn with_on_connect<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut TcpClient, Option<SocketError>) + 'static,
    {
        self.set_on_connect(handler);
        self
    }

    /// Set the disconnect callback, builder style.
    pub fn with_on_disconnect<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut TcpClient, Option<SocketError>) + 'static,
    {
        self.set_on_disconnect(handler);
        self
    }

    /// Set the read callback, builder style.
    pub fn with_on_read<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut TcpClient, Bytes) + 'static,
    {
        self.set_on_read(handler);
        self
    }

    /// Replace the connect callback.
    pub fn set_on_connect<F>(&mut self, handler: F)
    where
        F: FnMut(&mut TcpClient, Option<SocketError>) + 'static,
    {
        self.on_connect = Some(Box::new(handler));
    }

    /// Replace the disconnect callback.
    pub fn set_on_disconnect<F>(&mut self, handler: F)
    where
        F: FnMut(&mut TcpClient, Option<SocketError>) + 'static,
    {
        self.on_disconnect = Some(Box::new(handler));
    }

    /// Replace the read callback.
    pub fn set_on_read<F>(&mut self, handler: F)
    where
        F: FnMut(&mut TcpClient, Bytes) + 'static,
    {
        self.on_read = Some(Box::new(handler));
    }

    /// Whether a connect callback is currently registered.
    pub fn has_connect_handler(&self) -> bool {
        self.on_connect.is_some()
    }

    /// Whether a disconnect callback is currently registered.
    pub fn has_disconnect_handler(&self) -> bool {
        self.on_disconnect.is_some()
    }

    /// Whether a read callback is currently registered.
    pub fn has_read_handler(&self) -> bool {
        self.on_read.is_some()
    }

    /// Install an existing stream pair, closing any pair already owned.
    ///
    /// The next [`connect`](Self::connect) opens these streams instead of
    /// asking the factory for new ones.
    pub fn set_streams(&mut self, pair: StreamPair) {
        self.release_streams();
        self.attach(pair);
    }

    /// Whether the client currently owns a stream pair.
    pub fn has_streams(&self) -> bool {
        self.readable.is_some() && self.writable.is_some()
    }

    /// Get the current connection state.
    pub fn state(&self) -> TcpConnectionState {
        self.state
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state == TcpConnectionState::Connected
    }

    /// Whether the connection deadline is armed.
    pub fn has_active_timer(&self) -> bool {
        self.timeout_timer.is_some()
    }

    /// Number of bytes waiting for the writable stream to accept them.
    pub fn pending_write_len(&self) -> usize {
        self.write_queue.len()
    }

    /// The `host:port` of the last connection attempt.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &TcpClientConfig {
        &self.config
    }

    /// Start connecting to `host:port`, giving up after `timeout`.
    ///
    /// The result is reported through `on_connect`. If a stream pair is
    /// already owned it is reused; otherwise one is requested from the
    /// factory. A factory failure is logged and the attempt ends by timeout.
    pub fn connect(&mut self, host: &str, port: u32, timeout: Duration) {
        self.address = Some(format!("{host}:{port}"));

        if !self.has_streams() {
            self.release_streams();
            match self.factory.create_pair(host, port) {
                Ok(pair) => self.attach(pair),
                Err(err) => {
                    tracing::warn!(target: targets::TCP, host, port, %err, "failed to create stream pair");
                }
            }
        }

        self.cancel_timer();
        self.timeout_timer = Some(self.handle.schedule_once(timeout));
        self.state = TcpConnectionState::Connecting;
        tracing::debug!(target: targets::TCP, host, port, ?timeout, "connecting");

        // Opening one member of the pair starts the connection.
        if let Some(readable) = self.readable.as_mut() {
            readable.open();
        }
    }

    /// [`connect`](Self::connect) using the configured default timeout.
    pub fn connect_with_default_timeout(&mut self, host: &str, port: u32) {
        let timeout = self.config.connect_timeout;
        self.connect(host, port, timeout);
    }

    /// Queue `data` for the peer without blocking.
    ///
    /// Bytes the writable stream does not accept right away are kept, in
    /// order, and retried when it reports space. Empty input is ignored.
    pub fn send(&mut self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        if data.is_empty() {
            return;
        }

        if self.write_queue.is_empty() {
            self.write_now(data);
        } else {
            // Earlier bytes are still queued; keep them ahead of `data`.
            self.write_queue.extend_from_slice(data);
            self.flush_write_queue();
        }
    }

    /// Close both streams and drop all queued bytes.
    ///
    /// Safe to call at any time, any number of times. Callbacks stay
    /// registered and `on_disconnect` is not fired.
    pub fn disconnect(&mut self) {
        self.cancel_timer();
        self.release_streams();
        self.read_queue.clear();
        self.write_queue.clear();

        if self.state != TcpConnectionState::Idle && self.state != TcpConnectionState::Closed {
            tracing::debug!(target: targets::TCP, address = ?self.address, "disconnected");
            self.state = TcpConnectionState::Closed;
        }
    }

    /// Feed one run-loop event into the state machine.
    pub fn handle_event(&mut self, event: LoopEvent<StreamEvent>) {
        match event {
            LoopEvent::Timer { id } => {
                if self.timeout_timer == Some(id) {
                    self.timeout_timer = None;
                    self.timeout_triggered();
                } else {
                    tracing::trace!(target: targets::TCP, ?id, "ignoring unrelated timer");
                }
            }
            LoopEvent::Source(event) => self.handle_stream_event(event),
        }
    }

    /// Feed one stream notification into the state machine.
    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        if self.readable.is_none() && self.writable.is_none() {
            tracing::trace!(target: targets::TCP, ?event, "no streams, ignoring event");
            return;
        }
        if event.generation != self.generation {
            tracing::trace!(
                target: targets::TCP,
                ?event,
                current = self.generation,
                "event from a released stream pair, ignoring"
            );
            return;
        }

        tracing::trace!(target: targets::TCP, ?event, state = %self.state, "stream event");
        match event.kind {
            StreamEventKind::OpenCompleted => self.open_completed(),
            StreamEventKind::HasBytesAvailable => self.drain_readable(),
            StreamEventKind::HasSpaceAvailable => self.flush_write_queue(),
            StreamEventKind::ErrorOccurred => self.error_occurred(event.source),
            StreamEventKind::EndEncountered => self.end_encountered(),
        }
    }

    fn attach(&mut self, pair: StreamPair) {
        let StreamPair {
            mut readable,
            mut writable,
        } = pair;
        self.generation = self.generation.wrapping_add(1);
        readable.set_observer(Some(StreamObserver::new(
            self.handle.clone(),
            self.generation,
            StreamSource::Readable,
        )));
        writable.set_observer(Some(StreamObserver::new(
            self.handle.clone(),
            self.generation,
            StreamSource::Writable,
        )));
        self.readable = Some(readable);
        self.writable = Some(writable);
    }

    fn release_streams(&mut self) {
        if let Some(mut readable) = self.readable.take() {
            readable.set_observer(None);
            readable.close();
        }
        if let Some(mut writable) = self.writable.take() {
            writable.set_observer(None);
            writable.close();
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(id) = self.timeout_timer.take()
            && self.handle.cancel(id).is_err()
        {
            tracing::trace!(target: targets::TCP, ?id, "timeout timer already gone");
        }
    }

    /// Offer `data` to the writable stream, queueing whatever it refuses.
    fn write_now(&mut self, data: &[u8]) {
        let Some(writable) = self
            .writable
            .as_mut()
            .filter(|writable| writable.has_space_available())
        else {
            self.write_queue.extend_from_slice(data);
            return;
        };

        match writable.write(data) {
            Ok(written) if written >= data.len() => {}
            Ok(written) => {
                tracing::trace!(target: targets::TCP, written, total = data.len(), "partial write");
                self.write_queue.extend_from_slice(&data[written..]);
            }
            Err(err) => {
                tracing::debug!(target: targets::TCP, %err, len = data.len(), "write failed, requeueing");
                self.write_queue.extend_from_slice(data);
            }
        }
    }

    fn flush_write_queue(&mut self) {
        if self.write_queue.is_empty() {
            return;
        }
        let backlog = self.write_queue.split().freeze();
        self.write_now(&backlog);
    }

    fn open_completed(&mut self) {
        if self.state != TcpConnectionState::Connecting {
            tracing::trace!(target: targets::TCP, state = %self.state, "ignoring open outside of a connection attempt");
            return;
        }
        self.cancel_timer();
        self.state = TcpConnectionState::Connected;
        tracing::debug!(target: targets::TCP, address = ?self.address, "connected");

        // The connect callback fires once per successful connection.
        if let Some(mut handler) = self.on_connect.take() {
            handler(self, None);
        }
    }

    fn drain_readable(&mut self) {
        let Some(readable) = self.readable.as_mut() else {
            return;
        };

        while readable.has_bytes_available() {
            match readable.read(&mut self.read_buffer) {
                Ok(0) => break,
                Ok(read) => {
                    let read = read.min(self.read_buffer.len());
                    self.read_queue.extend_from_slice(&self.read_buffer[..read]);
                }
                Err(err) => {
                    tracing::debug!(target: targets::TCP, %err, "read failed");
                    break;
                }
            }
        }

        if self.read_queue.is_empty() {
            return;
        }
        let data = self.read_queue.split().freeze();
        if let Some(mut handler) = self.on_read.take() {
            handler(self, data);
            if self.on_read.is_none() {
                self.on_read = Some(handler);
            }
        }
    }

    fn error_occurred(&mut self, source: StreamSource) {
        let raw = match source {
            StreamSource::Readable => self.readable.as_ref().and_then(|stream| stream.error()),
            StreamSource::Writable => self.writable.as_ref().and_then(|stream| stream.error()),
        };
        let error = SocketError::classify(raw.as_ref());

        if self.state != TcpConnectionState::Connecting {
            // Only connection attempts have a channel for errors.
            tracing::warn!(
                target: targets::TCP,
                ?source,
                error = ?raw,
                state = %self.state,
                "stream error outside of a connection attempt"
            );
            return;
        }

        tracing::debug!(target: targets::TCP, ?source, error = ?raw, "connection attempt failed");
        self.cancel_timer();
        self.state = TcpConnectionState::Closed;
        if let Some(mut handler) = self.on_connect.take() {
            handler(self, Some(error));
            if self.on_connect.is_none() {
                self.on_connect = Some(handler);
            }
        }
    }

    fn end_encountered(&mut self) {
        tracing::debug!(target: targets::TCP, address = ?self.address, "peer closed the connection");
        self.state = TcpConnectionState::Closed;
        if let Some(mut handler) = self.on_disconnect.take() {
            handler(self, None);
            if self.on_disconnect.is_none() {
                self.on_disconnect = Some(handler);
            }
        }
    }

    fn timeout_triggered(&mut self) {
        tracing::debug!(target: targets::TCP, address = ?self.address, "connection attempt timed out");
        self.state = TcpConnectionState::Closed;
        if let Some(mut handler) = self.on_connect.take() {
            handler(self, Some(SocketError::Timeout));
            if self.on_connect.is_none() {
                self.on_connect = Some(handler);
            }
        }

        // A handler that called `connect` again armed a fresh deadline.
        if self.timeout_timer.is_none() {
            self.disconnect();
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("pending_read", &self.read_queue.len())
            .field("pending_write", &self.write_queue.len())
            .field("timeout_armed", &self.timeout_timer.is_some())
            .finish()
    }
}
