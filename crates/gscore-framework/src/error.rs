//! Framework error types.

use gscore_core::StoreError;
use thiserror::Error;

/// Errors raised by module creation and policy updates.
#[derive(Debug, Clone, Error)]
pub enum SvError {
    /// The configuration store failed a read or a write.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The stored record for a module could not be read back.
    #[error("invalid stored record for module '{name}': {reason}")]
    InvalidRecord {
        /// Module name.
        name: String,
        /// Why the record was rejected.
        reason: String,
    },
}

/// Result type for module operations.
pub type SvResult<T> = Result<T, SvError>;
