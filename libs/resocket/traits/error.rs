use std::time::Duration;
use thiserror::Error;

/// Main error type for resocket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Opening a transport handle failed outright
    #[error("Failed to dial {address}: {reason}")]
    Dial { address: String, reason: String },

    /// The transport did not signal open within the connect timeout
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The connection closed before it finished opening
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Send rejected (not open, or refused by the transport)
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Close request raised a fault
    #[error("Close failed: {0}")]
    CloseFailed(String),

    /// Raw fault raised by a transport handle
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SocketError {
    /// Whether this error came from establishing a connection
    ///
    /// Dial faults are fatal for the first open and absorbed into the
    /// backoff cycle during reconnection.
    pub fn is_dial_fault(&self) -> bool {
        matches!(
            self,
            SocketError::Dial { .. } | SocketError::ConnectTimeout(_) | SocketError::ConnectionClosed(_)
        )
    }
}

/// Result type for resocket operations
pub type Result<T> = std::result::Result<T, SocketError>;
