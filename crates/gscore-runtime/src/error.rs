//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use gscore_core::DecodeError;
use gscore_framework::SvError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Module creation or policy persistence failed.
    #[error(transparent)]
    Sv(#[from] SvError),

    /// An inbound frame could not be decoded.
    #[error("Connection {connection}: {source}")]
    Decode {
        connection: String,
        #[source]
        source: DecodeError,
    },

    /// No session is registered under this connection id.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
