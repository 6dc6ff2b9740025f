//! Domain-specific error types for the mirroring client.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! No panics on invalid input — every error is typed and recoverable.
//!
//! Note that a video frame with no locatable start code is *not* an
//! error anywhere in this crate: the demuxer forwards such buffers
//! unchanged rather than dropping data.

use thiserror::Error;

/// The canonical error type for the mirroring client core.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The streaming socket could not be opened.
    #[error("failed to open stream socket: {0}")]
    TransportOpen(String),

    /// The socket failed after it was successfully opened.
    #[error("transport error: {0}")]
    Transport(String),

    /// The socket was closed (cleanly or by the server).
    #[error("transport closed")]
    TransportClosed,

    /// An event channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Session Errors ───────────────────────────────────────────
    /// A session state transition was requested from the wrong phase.
    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),

    /// No decode backend passed its capability probe.
    #[error("no supported decode sink: {0}")]
    UnsupportedDecodeSink(&'static str),

    // ── Sink Errors ──────────────────────────────────────────────
    /// The decode sink's I/O layer reported an error.
    #[error("sink error: {0}")]
    Sink(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = StreamError::TransportOpen("connection refused".into());
        assert!(e.to_string().contains("connection refused"));

        let e = StreamError::UnsupportedDecodeSink("no backend");
        assert!(e.to_string().contains("decode sink"));
    }

    #[test]
    fn from_string() {
        let e: StreamError = "something broke".into();
        assert!(matches!(e, StreamError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: StreamError = io_err.into();
        assert!(matches!(e, StreamError::Sink(_)));
    }
}
