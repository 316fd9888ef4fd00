//! Socket-backed stream pairs.
//!
//! Blocking socket work happens on helper threads. The streams themselves
//! never block: reads drain an inbound buffer filled by a reader thread, and
//! writes hand bytes to a writer thread up to the configured buffer size.
//! Progress is reported to the owning run loop through the registered
//! [`StreamObserver`]s.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tether_core::logging::targets;

use super::config::TcpSocketConfig;
use crate::error::{NetworkError, Result};
use crate::stream::{
    ReadableStream, StreamEventKind, StreamFactory, StreamObserver, StreamPair, StreamSource,
    WritableStream,
};

/// Creates stream pairs backed by real TCP sockets.
#[derive(Debug, Clone, Default)]
pub struct TcpStreamFactory {
    config: TcpSocketConfig,
}

impl TcpStreamFactory {
    /// Create a factory with the given socket configuration.
    pub fn new(config: TcpSocketConfig) -> Self {
        Self { config }
    }

    /// Get the socket configuration.
    pub fn config(&self) -> &TcpSocketConfig {
        &self.config
    }
}

impl StreamFactory for TcpStreamFactory {
    fn create_pair(&mut self, host: &str, port: u32) -> Result<StreamPair> {
        let port = u16::try_from(port).map_err(|_| NetworkError::InvalidPort(port))?;
        let shared = Arc::new(Mutex::new(Shared::new(host, port, self.config.clone())));
        Ok(StreamPair::new(
            TcpReadStream {
                shared: Arc::clone(&shared),
            },
            TcpWriteStream { shared },
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Opening,
    Open,
    Closed,
    Failed,
}

#[derive(Debug)]
struct Shared {
    host: String,
    port: u16,
    config: TcpSocketConfig,
    phase: Phase,
    socket: Option<TcpStream>,
    inbound: BytesMut,
    error: Option<(io::ErrorKind, String)>,
    outbound: Option<Sender<Bytes>>,
    /// Bytes handed to the writer thread and not yet written to the socket.
    in_flight: usize,
    read_opened: bool,
    write_opened: bool,
    read_observer: Option<StreamObserver>,
    write_observer: Option<StreamObserver>,
}

type SharedState = Arc<Mutex<Shared>>;

impl Shared {
    fn new(host: &str, port: u16, config: TcpSocketConfig) -> Self {
        Self {
            host: host.to_owned(),
            port,
            config,
            phase: Phase::Idle,
            socket: None,
            inbound: BytesMut::new(),
            error: None,
            outbound: None,
            in_flight: 0,
            read_opened: false,
            write_opened: false,
            read_observer: None,
            write_observer: None,
        }
    }

    fn notify(&self, source: StreamSource, kind: StreamEventKind) {
        let observer = match source {
            StreamSource::Readable => self.read_observer.as_ref(),
            StreamSource::Writable => self.write_observer.as_ref(),
        };
        if let Some(observer) = observer {
            observer.notify(kind);
        }
    }

    fn stored_error(&self) -> Option<io::Error> {
        self.error
            .as_ref()
            .map(|(kind, message)| io::Error::new(*kind, message.clone()))
    }

    fn fail(&mut self, err: &io::Error) {
        tracing::debug!(
            target: targets::STREAM,
            host = %self.host,
            port = self.port,
            %err,
            "socket failed"
        );
        self.phase = Phase::Failed;
        self.error = Some((err.kind(), err.to_string()));
        self.outbound = None;
        self.shutdown_socket();
        self.notify(StreamSource::Readable, StreamEventKind::ErrorOccurred);
    }

    fn shutdown_socket(&mut self) {
        if let Some(socket) = self.socket.take()
            && let Err(err) = socket.shutdown(Shutdown::Both)
        {
            tracing::trace!(target: targets::STREAM, %err, "socket shutdown failed");
        }
    }
}

fn open_member(shared: &SharedState, source: StreamSource) {
    let mut state = shared.lock();
    match source {
        StreamSource::Readable => state.read_opened = true,
        StreamSource::Writable => state.write_opened = true,
    }

    match state.phase {
        Phase::Idle => {
            state.phase = Phase::Opening;
            drop(state);
            spawn_connect(shared);
        }
        Phase::Open => {
            state.notify(source, StreamEventKind::OpenCompleted);
            if source == StreamSource::Writable {
                state.notify(source, StreamEventKind::HasSpaceAvailable);
            }
        }
        Phase::Failed => state.notify(source, StreamEventKind::ErrorOccurred),
        Phase::Opening | Phase::Closed => {}
    }
}

fn close_shared(shared: &SharedState) {
    let mut state = shared.lock();
    if state.phase == Phase::Closed {
        return;
    }
    tracing::trace!(
        target: targets::STREAM,
        host = %state.host,
        port = state.port,
        "closing socket streams"
    );
    state.phase = Phase::Closed;
    state.outbound = None;
    state.read_observer = None;
    state.write_observer = None;
    state.shutdown_socket();
}

fn spawn_worker<F>(name: String, shared: &SharedState, work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(err) = thread::Builder::new().name(name).spawn(work) {
        shared.lock().fail(&err);
    }
}

fn spawn_connect(shared: &SharedState) {
    let (host, port) = {
        let state = shared.lock();
        (state.host.clone(), state.port)
    };
    let worker = Arc::clone(shared);
    spawn_worker(format!("tether-connect-{host}:{port}"), shared, move || {
        tracing::trace!(target: targets::STREAM, %host, port, "resolving and connecting");
        match TcpStream::connect((host.as_str(), port)) {
            Ok(socket) => establish(&worker, socket),
            Err(err) => {
                let mut state = worker.lock();
                if state.phase == Phase::Opening {
                    state.fail(&err);
                }
            }
        }
    });
}

fn establish(shared: &SharedState, socket: TcpStream) {
    let mut state = shared.lock();
    if state.phase != Phase::Opening {
        // Closed while the connect was in progress.
        if let Err(err) = socket.shutdown(Shutdown::Both) {
            tracing::trace!(target: targets::STREAM, %err, "late socket shutdown failed");
        }
        return;
    }

    if let Err(err) = socket.set_nodelay(state.config.no_delay) {
        tracing::warn!(target: targets::STREAM, %err, "failed to set TCP_NODELAY");
    }

    let (reader, writer) = match (socket.try_clone(), socket.try_clone()) {
        (Ok(reader), Ok(writer)) => (reader, writer),
        (Err(err), _) | (_, Err(err)) => {
            state.socket = Some(socket);
            state.fail(&err);
            return;
        }
    };

    let (sender, receiver) = crossbeam_channel::unbounded();
    state.socket = Some(socket);
    state.outbound = Some(sender);
    state.phase = Phase::Open;
    let read_chunk = state.config.read_buffer_size;
    let name = format!("{}:{}", state.host, state.port);
    tracing::debug!(target: targets::STREAM, peer = %name, "socket connected");

    if state.read_opened {
        state.notify(StreamSource::Readable, StreamEventKind::OpenCompleted);
    }
    if state.write_opened {
        state.notify(StreamSource::Writable, StreamEventKind::OpenCompleted);
    }
    state.notify(StreamSource::Writable, StreamEventKind::HasSpaceAvailable);
    drop(state);

    let read_shared = Arc::clone(shared);
    spawn_worker(format!("tether-read-{name}"), shared, move || {
        read_loop(&read_shared, reader, read_chunk);
    });
    let write_shared = Arc::clone(shared);
    spawn_worker(format!("tether-write-{name}"), shared, move || {
        write_loop(&write_shared, writer, &receiver);
    });
}

fn read_loop(shared: &SharedState, mut socket: TcpStream, chunk: usize) {
    let mut buf = vec![0u8; chunk];
    loop {
        match socket.read(&mut buf) {
            Ok(0) => {
                let state = shared.lock();
                if state.phase == Phase::Open {
                    state.notify(StreamSource::Readable, StreamEventKind::EndEncountered);
                }
                return;
            }
            Ok(read) => {
                let mut state = shared.lock();
                if state.phase != Phase::Open {
                    return;
                }
                state.inbound.extend_from_slice(&buf[..read]);
                state.notify(StreamSource::Readable, StreamEventKind::HasBytesAvailable);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                let mut state = shared.lock();
                if state.phase == Phase::Open {
                    state.fail(&err);
                }
                return;
            }
        }
    }
}

fn write_loop(shared: &SharedState, mut socket: TcpStream, receiver: &Receiver<Bytes>) {
    for chunk in receiver.iter() {
        if let Err(err) = socket.write_all(&chunk) {
            let mut state = shared.lock();
            if state.phase == Phase::Open {
                state.fail(&err);
            }
            return;
        }

        let mut state = shared.lock();
        state.in_flight = state.in_flight.saturating_sub(chunk.len());
        if state.phase == Phase::Open {
            state.notify(StreamSource::Writable, StreamEventKind::HasSpaceAvailable);
        }
    }
}

/// The receiving half of a socket-backed pair.
#[derive(Debug)]
pub struct TcpReadStream {
    shared: SharedState,
}

impl ReadableStream for TcpReadStream {
    fn open(&mut self) {
        open_member(&self.shared, StreamSource::Readable);
    }

    fn close(&mut self) {
        close_shared(&self.shared);
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        if state.inbound.is_empty() {
            return match state.stored_error() {
                Some(err) => Err(err),
                None => Ok(0),
            };
        }
        let read = buf.len().min(state.inbound.len());
        buf[..read].copy_from_slice(&state.inbound.split_to(read));
        Ok(read)
    }

    fn has_bytes_available(&self) -> bool {
        !self.shared.lock().inbound.is_empty()
    }

    fn set_observer(&mut self, observer: Option<StreamObserver>) {
        self.shared.lock().read_observer = observer;
    }

    fn error(&self) -> Option<io::Error> {
        self.shared.lock().stored_error()
    }
}

impl Drop for TcpReadStream {
    fn drop(&mut self) {
        close_shared(&self.shared);
    }
}

/// The sending half of a socket-backed pair.
#[derive(Debug)]
pub struct TcpWriteStream {
    shared: SharedState,
}

impl WritableStream for TcpWriteStream {
    fn open(&mut self) {
        open_member(&self.shared, StreamSource::Writable);
    }

    fn close(&mut self) {
        close_shared(&self.shared);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Open {
            return Err(state
                .stored_error()
                .unwrap_or_else(|| io::Error::from(io::ErrorKind::NotConnected)));
        }

        let capacity = state.config.write_buffer_size.saturating_sub(state.in_flight);
        let accepted = capacity.min(data.len());
        if accepted == 0 {
            return Ok(0);
        }

        let sender = state
            .outbound
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        sender
            .send(Bytes::copy_from_slice(&data[..accepted]))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        state.in_flight += accepted;
        Ok(accepted)
    }

    fn has_space_available(&self) -> bool {
        let state = self.shared.lock();
        state.phase == Phase::Open && state.in_flight < state.config.write_buffer_size
    }

    fn set_observer(&mut self, observer: Option<StreamObserver>) {
        self.shared.lock().write_observer = observer;
    }

    fn error(&self) -> Option<io::Error> {
        self.shared.lock().stored_error()
    }
}

impl Drop for TcpWriteStream {
    fn drop(&mut self) {
        close_shared(&self.shared);
    }
}
