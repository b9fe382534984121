//! Client error types.

/// Errors surfaced by stream and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The transport failed to establish the connection.
    #[error("connect failed: {message}")]
    Connect {
        /// Transport-reported reason.
        message: String,
    },

    /// The connection is up but a write was rejected by the transport.
    #[error("send failed: {message}")]
    Send {
        /// Transport-reported reason.
        message: String,
    },

    /// Operation attempted while the stream (or channel) is not open.
    #[error("stream is already closed")]
    NotConnected,

    /// `disconnect()` did not observe the closed state within its bound.
    #[error("disconnect timed out after {waited_ms} ms")]
    DisconnectTimeout {
        /// The configured bound that elapsed.
        waited_ms: u64,
    },

    /// Inbound data did not parse as a frame. This kind is logged and the
    /// input dropped; it is never returned by a public operation.
    #[error("malformed frame: {detail}")]
    MalformedFrame {
        /// Parser diagnostic.
        detail: String,
    },
}

impl StreamError {
    /// Connect failure with a transport-reported reason.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Write failure with a transport-reported reason.
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
