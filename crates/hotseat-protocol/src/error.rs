//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not a well-formed envelope, or its `data` does not
    /// match the fields its `type` requires.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope's `type` tag names no known inbound event.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}
