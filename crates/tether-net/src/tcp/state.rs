//! State enum for TCP client connections.

/// Current state of a [`super::TcpClient`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpConnectionState {
    /// No connection has been attempted yet.
    #[default]
    Idle,
    /// Streams are opening and the connection deadline is armed.
    Connecting,
    /// The stream pair reported that it opened.
    Connected,
    /// The attempt failed, the peer closed, or the client disconnected.
    Closed,
}

impl std::fmt::Display for TcpConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
