//! Dispatch error types.

use thiserror::Error;

/// Errors surfaced by the engine before any send is attempted.
///
/// Recipient-level failures are never errors; they are data in the `DispatchResult`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid dispatch request: {0}")]
    Validation(String),
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
