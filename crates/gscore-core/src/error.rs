//! Error types shared by the gscore layers.
//!
//! Framework-level errors (like `SvError`) are defined in gscore-framework.

use thiserror::Error;

// =============================================================================
// Send Errors
// =============================================================================

/// Errors that can occur while sending an outbound message.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The payload could not be normalized into a non-empty segment list.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The session's connection has been closed.
    #[error("connection '{bot_id}' is closed")]
    ConnectionClosed {
        /// Backend id of the closed connection.
        bot_id: String,
    },

    /// The envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialization(String),
}

impl SendError {
    /// Creates an invalid payload error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    /// Creates a connection closed error.
    pub fn closed(bot_id: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            bot_id: bot_id.into(),
        }
    }
}

impl From<serde_json::Error> for SendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by a [`ConfigStore`](crate::store::ConfigStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing storage could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backing document exists but is not valid.
    #[error("corrupt configuration document: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors raised while decoding an inbound frame.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not a valid inbound message record.
    #[error("malformed inbound frame: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for send operations.
pub type SendResult<T> = Result<T, SendError>;

/// Result type for configuration store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for inbound decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
