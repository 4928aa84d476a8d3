//! Errors raised by the service layer itself.
//!
//! Import/export and storage keep their own enums next to their managers;
//! everything converges on [`ErrorCode`] before crossing the service boundary.

use thiserror::Error;
use trellis_core::{ErrorCode, codes};

/// A service call that never reached the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The canvas has not been initialized, or was destroyed.
    #[error("canvas is not ready (call initialize first)")]
    NotReady,
    /// The canvas was destroyed and cannot be initialized again.
    #[error("canvas has been destroyed")]
    Destroyed,
    /// A caller-supplied value is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            ServiceError::NotReady | ServiceError::Destroyed => codes::NOT_READY,
            ServiceError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
        }
    }
}
