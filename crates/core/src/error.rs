//! Message-level error model.

use thiserror::Error;

/// Result type used by the data model.
pub type MessageResult<T> = Result<T, MessageError>;

/// Error raised while building, encoding or decoding a message.
///
/// Keep this focused on deterministic data failures. Transport concerns belong
/// to the broker layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// A value failed validation (e.g. empty message id).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The payload does not match the expected message shape.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The message could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl MessageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
