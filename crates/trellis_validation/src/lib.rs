//! Validation for Trellis canvases (Layer 2).
//!
//! # Core Concepts
//!
//! - [`ValidationEngine`] - Owns rules, connection policy and node types
//! - [`ValidationRule`] - User predicate over nodes, connections, data or the graph
//! - [`ValidationResult`] - Errors and warnings; `valid` iff no errors
//! - [`StructuralViolation`] - Built-in invariant failures that always block
//!
//! # Severity
//!
//! Errors block commits. Warnings block only in strict mode. Infos never
//! block. Structural violations are always errors.

/// The engine.
pub mod engine;

/// Findings and results.
pub mod report;

/// User rules.
pub mod rule;

/// Built-in graph invariants.
pub mod structural;

/// Marketing-flow shape checks.
pub mod workflow;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::engine::{CommitScope, ValidationEngine};
    pub use crate::report::{Severity, ValidationIssue, ValidationResult};
    pub use crate::rule::{RuleError, RuleInfo, RuleKind, ValidationRule};
    pub use crate::structural::{STRUCTURAL_RULE, StructuralViolation};
}

pub use engine::{CommitScope, ValidationEngine};
pub use report::{Severity, ValidationIssue, ValidationResult};
pub use rule::{RuleError, RuleKind, ValidationRule};
pub use structural::StructuralViolation;
