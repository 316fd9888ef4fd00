//! In-memory streams for driving a [`crate::tcp::TcpClient`] deterministically.
//!
//! Each mock is a cheap handle over shared state: hand one clone to the client
//! (through [`MockStreamFactory`] or [`crate::tcp::TcpClient::set_streams`])
//! and keep another to script reads, inject events, and inspect writes.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::{NetworkError, Result};
use crate::stream::{
    ReadableStream, StreamEventKind, StreamFactory, StreamObserver, StreamPair, WritableStream,
};

#[derive(Debug, Default)]
struct MockReadState {
    open_event: Option<StreamEventKind>,
    chunks: VecDeque<Bytes>,
    observer: Option<StreamObserver>,
    error: Option<io::ErrorKind>,
    fail_reads: bool,
    is_open: bool,
    open_count: usize,
    close_count: usize,
    read_calls: usize,
}

/// A scripted readable stream.
#[derive(Debug, Clone, Default)]
pub struct MockReadableStream {
    state: Arc<Mutex<MockReadState>>,
}

impl MockReadableStream {
    /// Create a stream that stays silent when opened.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream that reports `kind` as soon as it is opened.
    pub fn with_open_event(kind: StreamEventKind) -> Self {
        let stream = Self::new();
        stream.state.lock().open_event = Some(kind);
        stream
    }

    /// Queue `data` to be returned by subsequent reads.
    pub fn push_data(&self, data: impl Into<Bytes>) {
        let data = data.into();
        if !data.is_empty() {
            self.state.lock().chunks.push_back(data);
        }
    }

    /// Deliver `kind` to the registered observer.
    pub fn fire(&self, kind: StreamEventKind) {
        let observer = self.state.lock().observer.clone();
        if let Some(observer) = observer {
            observer.notify(kind);
        }
    }

    /// Put the stream into a failed state.
    pub fn set_error(&self, kind: io::ErrorKind) {
        self.state.lock().error = Some(kind);
    }

    /// Make every read fail with the stream error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Whether the stream is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }

    /// Whether an observer is registered.
    pub fn has_observer(&self) -> bool {
        self.state.lock().observer.is_some()
    }

    /// How many times the stream was opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// How many times the stream was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// How many times `read` was called.
    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }
}

impl ReadableStream for MockReadableStream {
    fn open(&mut self) {
        let (observer, open_event) = {
            let mut state = self.state.lock();
            state.is_open = true;
            state.open_count += 1;
            (state.observer.clone(), state.open_event)
        };
        if let (Some(observer), Some(kind)) = (observer, open_event) {
            observer.notify(kind);
        }
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.is_open = false;
        state.close_count += 1;
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.read_calls += 1;
        if state.fail_reads {
            return Err(state
                .error
                .map_or_else(|| io::Error::other("mock read failure"), io::Error::from));
        }

        let Some(chunk) = state.chunks.front_mut() else {
            return Ok(0);
        };
        let read = buf.len().min(chunk.len());
        buf[..read].copy_from_slice(&chunk.split_to(read));
        if chunk.is_empty() {
            state.chunks.pop_front();
        }
        Ok(read)
    }

    fn has_bytes_available(&self) -> bool {
        !self.state.lock().chunks.is_empty()
    }

    fn set_observer(&mut self, observer: Option<StreamObserver>) {
        self.state.lock().observer = observer;
    }

    fn error(&self) -> Option<io::Error> {
        self.state.lock().error.map(io::Error::from)
    }
}

#[derive(Debug)]
struct MockWriteState {
    space_available: bool,
    accept_limit: Option<usize>,
    fail_writes: bool,
    offered: Vec<Bytes>,
    accepted: BytesMut,
    observer: Option<StreamObserver>,
    error: Option<io::ErrorKind>,
    is_open: bool,
    open_count: usize,
    close_count: usize,
}

impl Default for MockWriteState {
    fn default() -> Self {
        Self {
            space_available: true,
            accept_limit: None,
            fail_writes: false,
            offered: Vec::new(),
            accepted: BytesMut::new(),
            observer: None,
            error: None,
            is_open: false,
            open_count: 0,
            close_count: 0,
        }
    }
}

/// A recording writable stream.
///
/// By default it always has space and accepts everything offered.
#[derive(Debug, Clone, Default)]
pub struct MockWritableStream {
    state: Arc<Mutex<MockWriteState>>,
}

impl MockWritableStream {
    /// Create a stream that accepts every write in full.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what `has_space_available` reports.
    pub fn set_space_available(&self, available: bool) {
        self.state.lock().space_available = available;
    }

    /// Accept at most `limit` bytes per write. `None` removes the limit.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.state.lock().accept_limit = limit;
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Put the stream into a failed state.
    pub fn set_error(&self, kind: io::ErrorKind) {
        self.state.lock().error = Some(kind);
    }

    /// Deliver `kind` to the registered observer.
    pub fn fire(&self, kind: StreamEventKind) {
        let observer = self.state.lock().observer.clone();
        if let Some(observer) = observer {
            observer.notify(kind);
        }
    }

    /// Everything passed to `write`, one entry per call.
    pub fn offered(&self) -> Vec<Bytes> {
        self.state.lock().offered.clone()
    }

    /// The concatenation of all accepted bytes.
    pub fn accepted(&self) -> Bytes {
        self.state.lock().accepted.clone().freeze()
    }

    /// How many times `write` was called.
    pub fn write_calls(&self) -> usize {
        self.state.lock().offered.len()
    }

    /// Whether the stream is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }

    /// Whether an observer is registered.
    pub fn has_observer(&self) -> bool {
        self.state.lock().observer.is_some()
    }

    /// How many times the stream was opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// How many times the stream was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl WritableStream for MockWritableStream {
    fn open(&mut self) {
        let mut state = self.state.lock();
        state.is_open = true;
        state.open_count += 1;
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.is_open = false;
        state.close_count += 1;
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.offered.push(Bytes::copy_from_slice(data));
        if state.fail_writes {
            return Err(state
                .error
                .map_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe), io::Error::from));
        }

        let written = state
            .accept_limit
            .map_or(data.len(), |limit| limit.min(data.len()));
        state.accepted.extend_from_slice(&data[..written]);
        Ok(written)
    }

    fn has_space_available(&self) -> bool {
        self.state.lock().space_available
    }

    fn set_observer(&mut self, observer: Option<StreamObserver>) {
        self.state.lock().observer = observer;
    }

    fn error(&self) -> Option<io::Error> {
        self.state.lock().error.map(io::Error::from)
    }
}

/// A factory that hands out clones of one mock stream pair.
#[derive(Debug, Clone, Default)]
pub struct MockStreamFactory {
    readable: MockReadableStream,
    writable: MockWritableStream,
    fail: bool,
    requests: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MockStreamFactory {
    /// Create a factory serving `readable` and `writable`.
    pub fn new(readable: MockReadableStream, writable: MockWritableStream) -> Self {
        Self {
            readable,
            writable,
            fail: false,
            requests: Arc::default(),
        }
    }

    /// Create a factory whose every request fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every `(host, port)` requested so far.
    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().clone()
    }
}

impl StreamFactory for MockStreamFactory {
    fn create_pair(&mut self, host: &str, port: u32) -> Result<StreamPair> {
        self.requests.lock().push((host.to_owned(), port));
        if self.fail {
            return Err(NetworkError::Connection(format!(
                "mock factory refused {host}:{port}"
            )));
        }
        Ok(StreamPair::new(self.readable.clone(), self.writable.clone()))
    }
}
