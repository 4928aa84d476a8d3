//! Store and history errors.

use thiserror::Error;
use trellis_core::value::PathError;
use trellis_core::{ConnectionId, ErrorCode, NodeId, NodeKind, SnapshotId, codes};
use trellis_validation::ValidationIssue;

/// Why a store operation was rejected. The store is unchanged afterwards.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No node with this id.
    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),
    /// No connection with this id.
    #[error("connection '{0}' not found")]
    ConnectionNotFound(ConnectionId),
    /// A node with this id already exists.
    #[error("node id '{0}' is already in use")]
    DuplicateNode(NodeId),
    /// A connection with this id already exists.
    #[error("connection id '{0}' is already in use")]
    DuplicateConnection(ConnectionId),
    /// Validation produced blocking findings.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationIssue>),
    /// The canvas is in view mode.
    #[error("canvas is read-only")]
    ReadOnly,
    /// A configured limit would be exceeded.
    #[error("{entity} limit of {limit} reached")]
    Capacity {
        /// `"node"` or `"connection"`.
        entity: &'static str,
        /// Configured limit.
        limit: usize,
    },
    /// The node's kind may not be deleted without forcing.
    #[error("node '{id}' of kind '{kind}' cannot be deleted")]
    NotDeletable {
        /// The node.
        id: NodeId,
        /// Its kind.
        kind: NodeKind,
    },
    /// The node's kind may not be resized.
    #[error("node '{0}' cannot be resized")]
    NotResizable(NodeId),
    /// A data path in a patch could not be written.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A caller-supplied value is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl StoreError {
    /// Blocking findings, for validation failures.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            StoreError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            StoreError::NodeNotFound(_) => codes::NODE_NOT_FOUND,
            StoreError::ConnectionNotFound(_) => codes::CONNECTION_NOT_FOUND,
            StoreError::DuplicateNode(_) => codes::DUPLICATE_NODE_ID,
            StoreError::DuplicateConnection(_) => codes::DUPLICATE_CONNECTION_ID,
            StoreError::Validation(_) => codes::VALIDATION_FAILED,
            StoreError::ReadOnly => codes::READ_ONLY,
            StoreError::Capacity { .. } => codes::CAPACITY_EXCEEDED,
            StoreError::NotDeletable { .. } => codes::NOT_DELETABLE,
            StoreError::NotResizable(_) | StoreError::Path(_) | StoreError::InvalidArgument(_) => {
                codes::INVALID_ARGUMENT
            }
        }
    }
}

/// Why a history operation was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    /// Nothing to undo.
    #[error("nothing to undo")]
    NothingToUndo,
    /// Nothing to redo.
    #[error("nothing to redo")]
    NothingToRedo,
    /// No snapshot with this id.
    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(SnapshotId),
    /// The present state cannot be deleted.
    #[error("snapshot '{0}' is the present state")]
    PresentSnapshot(SnapshotId),
    /// The store refused the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for HistoryError {
    fn code(&self) -> &'static str {
        match self {
            HistoryError::NothingToUndo | HistoryError::NothingToRedo => codes::HISTORY_EMPTY,
            HistoryError::SnapshotNotFound(_) => codes::SNAPSHOT_NOT_FOUND,
            HistoryError::PresentSnapshot(_) => codes::INVALID_ARGUMENT,
            HistoryError::Store(err) => err.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_messages() {
        let err = StoreError::Validation(vec![
            ValidationIssue::new("a", "A", "x", "first"),
            ValidationIssue::new("b", "B", "y", "second"),
        ]);
        assert_eq!(err.to_string(), "validation failed: first; second");
        assert_eq!(err.code(), codes::VALIDATION_FAILED);
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn history_errors_forward_store_codes() {
        let err = HistoryError::from(StoreError::ReadOnly);
        assert_eq!(err.code(), codes::READ_ONLY);
        assert_eq!(HistoryError::NothingToUndo.code(), codes::HISTORY_EMPTY);
    }
}
