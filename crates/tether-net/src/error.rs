//! Error types for the networking module.

use std::io;

/// Why a connection attempt failed, as reported through the connect callback.
///
/// This taxonomy is deliberately closed: anything that is not the connection
/// deadline expiring is [`SocketError::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum SocketError {
    /// The connection attempt exceeded its deadline.
    #[error("connection attempt timed out")]
    Timeout,
    /// The underlying stream reported an error.
    #[error("unknown socket error")]
    Unknown,
}

impl SocketError {
    /// Classify a raw stream error.
    ///
    /// Always yields [`SocketError::Unknown`]; timeouts are produced by the
    /// connection timer, never by a stream.
    pub fn classify(_error: Option<&io::Error>) -> Self {
        Self::Unknown
    }
}

/// Synchronous failures of the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The requested port does not fit in a TCP port number.
    #[error("Invalid port: {0}")]
    InvalidPort(u32),
    /// The stream is not connected.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_collapses_to_unknown() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);

        assert_eq!(SocketError::classify(Some(&refused)), SocketError::Unknown);
        assert_eq!(SocketError::classify(Some(&timed_out)), SocketError::Unknown);
        assert_eq!(SocketError::classify(None), SocketError::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(SocketError::Timeout.to_string(), "connection attempt timed out");
        assert_eq!(NetworkError::InvalidPort(70000).to_string(), "Invalid port: 70000");
    }

    #[test]
    fn test_connection_error_message() {
        let err = NetworkError::Connection("no route".into());
        assert_eq!(err.to_string(), "Connection error: no route");
    }
}
