//! Configuration types for the TCP client and its socket streams.

use std::time::Duration;

/// Socket-level options for [`super::TcpStreamFactory`] connections.
#[derive(Clone, Debug)]
pub struct TcpSocketConfig {
    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub no_delay: bool,
    /// Size of each read from the socket, in bytes.
    pub read_buffer_size: usize,
    /// Bytes the writable stream accepts before it reports itself full.
    pub write_buffer_size: usize,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self {
            no_delay: false,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
        }
    }
}

impl TcpSocketConfig {
    /// Create a new socket configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the write buffer size.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.max(1);
        self
    }
}

/// Configuration for a [`super::TcpClient`].
#[derive(Clone, Debug)]
pub struct TcpClientConfig {
    /// Size of the buffer used for each read while draining the readable
    /// stream.
    pub read_chunk_size: usize,
    /// Deadline used by [`super::TcpClient::connect_with_default_timeout`].
    pub connect_timeout: Duration,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 1024,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl TcpClientConfig {
    /// Create a new client configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read chunk size.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the default connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
