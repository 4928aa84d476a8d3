//! Layout errors.

use thiserror::Error;
use trellis_core::result::codes;
use trellis_core::{ErrorCode, NodeId, OperationError};

/// Why a layout or arrangement call was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// An id in the requested subset does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    /// An algorithm, alignment or distribution name was not recognised.
    #[error("unknown {kind}: {name}")]
    Unknown {
        /// What was being named, e.g. `"alignment"`.
        kind: &'static str,
        /// The rejected name.
        name: String,
    },
    /// A spacing or option value is out of range.
    #[error("invalid layout argument: {0}")]
    InvalidArgument(String),
    /// Layout options did not deserialize.
    #[error("invalid layout options: {0}")]
    Options(String),
    /// The store refused some of the computed moves.
    #[error("layout write-back rejected: {}", first_message(.0))]
    Rejected(Vec<OperationError>),
}

fn first_message(errors: &[OperationError]) -> &str {
    errors.first().map_or("", |e| e.message.as_str())
}

impl ErrorCode for LayoutError {
    fn code(&self) -> &'static str {
        match self {
            LayoutError::NodeNotFound(_) => codes::NODE_NOT_FOUND,
            LayoutError::Unknown { .. } | LayoutError::InvalidArgument(_) | LayoutError::Options(_) => {
                codes::INVALID_ARGUMENT
            }
            LayoutError::Rejected(errors) => errors
                .first()
                .map_or(codes::VALIDATION_FAILED, |e| known_code(&e.code)),
        }
    }
}

/// Maps a forwarded store code back onto its static constant.
fn known_code(code: &str) -> &'static str {
    [
        codes::READ_ONLY,
        codes::NODE_NOT_FOUND,
        codes::VALIDATION_FAILED,
        codes::INVALID_ARGUMENT,
    ]
    .into_iter()
    .find(|known| *known == code)
    .unwrap_or(codes::VALIDATION_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_forwards_store_code() {
        let err = LayoutError::Rejected(vec![OperationError::new(codes::READ_ONLY, "canvas is read-only")]);
        assert_eq!(err.code(), codes::READ_ONLY);
        assert_eq!(err.to_string(), "layout write-back rejected: canvas is read-only");
    }
}
