use thiserror::Error;

/// Errors surfaced while encoding or decoding a [`Message`](crate::Message) or
/// a value carried inside one. These are always logged and the offending
/// message is dropped — never propagated to a map caller.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode value: {0}")]
    Decode(#[source] bincode::Error),

    #[error("message for map {got:?} dropped, this instance is map {expected:?}")]
    MapIdMismatch { expected: Vec<u8>, got: Vec<u8> },

    #[error("buffer too small for message, discarded")]
    BufferTooSmall,
}
