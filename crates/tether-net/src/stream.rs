//! The byte-stream boundary a [`crate::tcp::TcpClient`] is built on.
//!
//! A connection is a pair of streams: one readable, one writable. Each stream
//! reports what happens to it through a single registered [`StreamObserver`],
//! which posts a [`StreamEvent`] onto the run loop that drives the client.
//! Opening either member of a pair starts the underlying connection.

use std::io;

use tether_core::LoopHandle;
use tether_core::logging::targets;

use crate::error::Result;

/// What happened on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    /// The stream finished opening.
    OpenCompleted,
    /// The readable stream has bytes to read.
    HasBytesAvailable,
    /// The writable stream can accept bytes.
    HasSpaceAvailable,
    /// The stream failed; see [`ReadableStream::error`] / [`WritableStream::error`].
    ErrorOccurred,
    /// The peer closed its side of the connection.
    EndEncountered,
}

/// Which member of a stream pair raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    /// The readable stream.
    Readable,
    /// The writable stream.
    Writable,
}

/// A notification from one stream of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamEvent {
    /// The attachment the stream pair was registered under. Events from a
    /// pair that has since been replaced carry an older generation.
    pub generation: u64,
    /// The stream that raised the event.
    pub source: StreamSource,
    /// What happened.
    pub kind: StreamEventKind,
}

impl StreamEvent {
    /// Create a new stream event.
    pub fn new(generation: u64, source: StreamSource, kind: StreamEventKind) -> Self {
        Self {
            generation,
            source,
            kind,
        }
    }
}

/// The observer registered on a stream.
///
/// Notifications are queued on the owning run loop and dispatched later on
/// its thread, so a stream may notify from inside `open` or from a helper
/// thread without re-entering its owner.
#[derive(Debug, Clone)]
pub struct StreamObserver {
    handle: LoopHandle<StreamEvent>,
    generation: u64,
    source: StreamSource,
}

impl StreamObserver {
    /// Create an observer that tags its events with `generation` and `source`.
    pub fn new(handle: LoopHandle<StreamEvent>, generation: u64, source: StreamSource) -> Self {
        Self {
            handle,
            generation,
            source,
        }
    }

    /// The attachment this observer belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The stream this observer is registered on.
    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Post `kind` to the run loop.
    ///
    /// Notifications sent after the run loop has gone away are dropped.
    pub fn notify(&self, kind: StreamEventKind) {
        if self
            .handle
            .post(StreamEvent::new(self.generation, self.source, kind))
            .is_err()
        {
            tracing::trace!(
                target: targets::STREAM,
                generation = self.generation,
                source = ?self.source,
                ?kind,
                "run loop gone, dropping stream event"
            );
        }
    }
}

/// The receiving half of a connection.
pub trait ReadableStream {
    /// Start opening the stream. Completion is reported as
    /// [`StreamEventKind::OpenCompleted`].
    fn open(&mut self);

    /// Close the stream. No events are delivered afterwards.
    fn close(&mut self);

    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing was read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether a read would currently return data.
    fn has_bytes_available(&self) -> bool;

    /// Register the observer, replacing any previous one.
    fn set_observer(&mut self, observer: Option<StreamObserver>);

    /// The error that put the stream into a failed state, if any.
    fn error(&self) -> Option<io::Error>;
}

/// The sending half of a connection.
pub trait WritableStream {
    /// Start opening the stream. Completion is reported as
    /// [`StreamEventKind::OpenCompleted`].
    fn open(&mut self);

    /// Close the stream. No events are delivered afterwards.
    fn close(&mut self);

    /// Offer `data` to the stream without blocking.
    ///
    /// Returns how many leading bytes were accepted, which may be fewer than
    /// `data.len()`.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Whether a write would currently accept at least one byte.
    fn has_space_available(&self) -> bool;

    /// Register the observer, replacing any previous one.
    fn set_observer(&mut self, observer: Option<StreamObserver>);

    /// The error that put the stream into a failed state, if any.
    fn error(&self) -> Option<io::Error>;
}

/// Both halves of one connection.
pub struct StreamPair {
    /// The receiving half.
    pub readable: Box<dyn ReadableStream>,
    /// The sending half.
    pub writable: Box<dyn WritableStream>,
}

impl StreamPair {
    /// Bundle two streams into a pair.
    pub fn new(
        readable: impl ReadableStream + 'static,
        writable: impl WritableStream + 'static,
    ) -> Self {
        Self {
            readable: Box::new(readable),
            writable: Box::new(writable),
        }
    }
}

impl std::fmt::Debug for StreamPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPair")
            .field("has_bytes_available", &self.readable.has_bytes_available())
            .field("has_space_available", &self.writable.has_space_available())
            .finish()
    }
}

/// Creates stream pairs bound to a remote host.
pub trait StreamFactory {
    /// Create an unopened stream pair for `host:port`.
    fn create_pair(&mut self, host: &str, port: u32) -> Result<StreamPair>;
}
