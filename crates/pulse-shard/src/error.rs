//! Shard error types

use thiserror::Error;

/// Shard error type
///
/// Transport and decode errors are recoverable (the runtime reconnects);
/// precondition errors are surfaced to the caller immediately.
#[derive(Debug, Error)]
pub enum ShardError {
    /// WebSocket transport error
    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Decompression failed mid-stream; the frame buffer cannot be recovered
    #[error("Decompression error: {0}")]
    Decompress(#[from] flate2::DecompressError),

    /// Decompressed frame was not valid UTF-8
    #[error("Invalid UTF-8 in frame: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Malformed JSON envelope
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server sent an envelope the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Resume was requested without a session to resume
    #[error("Cannot resume: no session id recorded")]
    ResumeUnavailable,

    /// A send was attempted while no socket was open
    #[error("Not connected")]
    NotConnected,

    /// The connection was closed by the peer
    #[error("Connection closed (code {code:?})")]
    Closed {
        /// Close code reported by the transport, if any
        code: Option<u16>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shard result type
pub type ShardResult<T> = Result<T, ShardError>;
