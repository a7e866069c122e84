//! # Message Errors
//!
//! Errors raised while encoding, decoding or sealing protocol messages.
//!
//! Adversarial input that decodes cleanly but fails a check is never an
//! error here: verification entry points return `bool`. Calling a mutator in
//! the wrong mode is a caller bug and panics.

use super::NodeId;
use thiserror::Error;

/// Malformed-message and sealing failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    /// Buffer ended before a fixed-size field could be read
    #[error("Truncated {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// A size declared inside the message exceeds what the buffer or limits allow
    #[error("Declared {field} size {declared} exceeds limit {limit}")]
    DeclaredSizeExceedsBuffer {
        field: &'static str,
        declared: usize,
        limit: usize,
    },

    /// Header mode flag is not one of the known values
    #[error("Invalid mode flag: {0:#04x}")]
    InvalidModeFlag(u8),

    /// Signature does not fit the fixed-capacity buffer
    #[error("Signature too long: {len} > {max}")]
    SignatureTooLong { len: usize, max: usize },

    /// No principal is known for this id
    #[error("Unknown principal: {0}")]
    UnknownPrincipal(NodeId),

    /// The identity service could not produce a signature or MAC
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Bytes remain after the declared end of the message
    #[error("Trailing bytes after message: {0}")]
    TrailingBytes(usize),

    /// A targeted message has no recipient to MAC for
    #[error("Targeted message has no destination")]
    MissingDestination,

    /// Encoded message would exceed the configured maximum
    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;
