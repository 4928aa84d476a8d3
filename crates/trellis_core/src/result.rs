//! Result envelopes returned across the service boundary.
//!
//! Internally every Trellis crate works with `Result<T, E>` where `E`
//! implements [`ErrorCode`]. At the service boundary those results are
//! flattened into [`OperationResult`] / [`BatchOperationResult`] so callers
//! always receive data, never a panic or an opaque error.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Stable machine-readable error codes.
pub mod codes {
    /// A node id did not resolve.
    pub const NODE_NOT_FOUND: &str = "NODE_NOT_FOUND";
    /// A connection id did not resolve.
    pub const CONNECTION_NOT_FOUND: &str = "CONNECTION_NOT_FOUND";
    /// A snapshot id did not resolve.
    pub const SNAPSHOT_NOT_FOUND: &str = "SNAPSHOT_NOT_FOUND";
    /// A created node reused an existing id.
    pub const DUPLICATE_NODE_ID: &str = "DUPLICATE_NODE_ID";
    /// A created connection reused an existing id.
    pub const DUPLICATE_CONNECTION_ID: &str = "DUPLICATE_CONNECTION_ID";
    /// Validation rejected the mutation.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    /// There is nothing to undo or redo.
    pub const HISTORY_EMPTY: &str = "HISTORY_EMPTY";
    /// The requested import/export format is not handled by the engine.
    pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED_FORMAT";
    /// The canvas is in view mode.
    pub const READ_ONLY: &str = "READ_ONLY";
    /// A configured node or connection limit would be exceeded.
    pub const CAPACITY_EXCEEDED: &str = "CAPACITY_EXCEEDED";
    /// The node kind may not be deleted.
    pub const NOT_DELETABLE: &str = "NOT_DELETABLE";
    /// A caller-supplied argument is malformed.
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    /// Parsing or serializing a document failed.
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    /// The storage backend failed.
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    /// A stored canvas id did not resolve.
    pub const CANVAS_NOT_FOUND: &str = "CANVAS_NOT_FOUND";
    /// A validation rule id did not resolve.
    pub const RULE_NOT_FOUND: &str = "RULE_NOT_FOUND";
    /// A validation rule id is already registered.
    pub const DUPLICATE_RULE: &str = "DUPLICATE_RULE";
    /// The rule is built in and cannot be removed.
    pub const BUILT_IN_RULE: &str = "BUILT_IN_RULE";
    /// The service has been destroyed or not initialized.
    pub const NOT_READY: &str = "NOT_READY";
}

/// Errors that carry a stable machine code.
pub trait ErrorCode {
    /// Returns the code, e.g. `"NODE_NOT_FOUND"`.
    fn code(&self) -> &'static str;
}

/// The error half of an [`OperationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Machine code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl OperationError {
    /// Creates an error from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Converts any coded error.
    #[must_use]
    pub fn from_error<E: ErrorCode + fmt::Display>(err: &E) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for OperationError {}

// ─────────────────────────────────────────────────────────────────────────────
// OperationResult
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a single service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Optional human-readable message, on success or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error code, mirrored from `error` for quick checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> OperationResult<T> {
    /// A successful result.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            code: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn fail(error: OperationError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.message.clone()),
            code: Some(error.code.clone()),
            error: Some(error),
        }
    }

    /// Converts an internal result.
    pub fn from_result<E: ErrorCode + fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(OperationError::from_error(&err)),
        }
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns the error code, if failed.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// Maps the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            message: self.message,
            code: self.code,
        }
    }

    /// Converts back into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried [`OperationError`] when the call failed.
    pub fn into_result(self) -> Result<Option<T>, OperationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchOperationResult
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a best-effort batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperationResult<T> {
    /// True iff every item succeeded.
    pub success: bool,
    /// Per-item results, in input order.
    pub results: Vec<OperationResult<T>>,
    /// Number of successful items.
    pub success_count: usize,
    /// Number of failed items.
    pub error_count: usize,
    /// Errors of the failed items, in input order.
    pub errors: Vec<OperationError>,
}

impl<T> BatchOperationResult<T> {
    /// Aggregates per-item results.
    #[must_use]
    pub fn from_results(results: Vec<OperationResult<T>>) -> Self {
        let errors: Vec<OperationError> =
            results.iter().filter_map(|r| r.error.clone()).collect();
        let error_count = errors.len();
        Self {
            success: error_count == 0,
            success_count: results.len() - error_count,
            error_count,
            errors,
            results,
        }
    }

    /// Payloads of the successful items.
    pub fn successes(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(|r| r.data.as_ref())
    }
}

impl<T> FromIterator<OperationResult<T>> for BatchOperationResult<T> {
    fn from_iter<I: IntoIterator<Item = OperationResult<T>>>(iter: I) -> Self {
        Self::from_results(iter.into_iter().collect())
    }
}
