//! # Engine Error Module
//!
//! Unified, documented error taxonomy for the task graph engine.
//!
//! Every fallible operation in `resolver`, `runner`, `cache`, and `form`
//! returns `Result<T>` below rather than an opaque `anyhow::Error`. Each
//! failure mode is a named variant with a stable `ENGINE-0xx` code, so log
//! lines and returned errors can be grepped and cross-referenced.
//!
//! Code ranges:
//! - `000-009` resolution (unresolved/ambiguous reference, type mismatch)
//! - `010-019` cycles
//! - `020-029` task execution / cancellation
//! - `030-039` form validation
//! - `040-049` cache propagation

use std::fmt;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Trait for errors that can suggest a fix to the caller.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    #[error("[ENGINE-000] no task provides reference '{reference}'")]
    UnresolvedReference { reference: String },

    #[error("[ENGINE-001] reference '{reference}' has {count} eligible candidates with none selected: {candidates:?}")]
    AmbiguousReference {
        reference: String,
        count: usize,
        candidates: Vec<String>,
    },

    #[error("[ENGINE-002] reference '{reference}' expects type '{expected}' but implementation '{implementation}' produces '{actual}'")]
    TypeMismatch {
        reference: String,
        implementation: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("[ENGINE-003] duplicate task implementation id '{0}'")]
    DuplicateImpl(String),

    #[error("[ENGINE-010] dependency cycle detected: {0}")]
    Cycle(String),

    #[error("[ENGINE-020] task '{task}' failed: {message}")]
    TaskFailure { task: String, message: String },

    #[error("[ENGINE-021] run cancelled{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled { reason: Option<String> },

    #[error("[ENGINE-022] task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    #[error("[ENGINE-030] validation failed for field '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("[ENGINE-040] cached computation for '{task}' failed: {message}")]
    CachePropagatedError { task: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn other(msg: impl Into<String>) -> Self {
        EngineError::Other(msg.into())
    }

    /// True if this error should terminate an in-flight run immediately.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            EngineError::TaskFailure { .. }
                | EngineError::Panicked { .. }
                | EngineError::Cancelled { .. }
                | EngineError::ValidationError { .. }
        )
    }
}

impl FixSuggestion for EngineError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            EngineError::UnresolvedReference { .. } => {
                Some("add a task providing this reference to the target or pool set")
            }
            EngineError::AmbiguousReference { .. } => {
                Some("select exactly one implementation explicitly, or narrow the pool")
            }
            EngineError::TypeMismatch { .. } => {
                Some("ensure every implementation of a reference produces the same type")
            }
            EngineError::DuplicateImpl(_) => {
                Some("each task's implementation id must be unique within a task set")
            }
            EngineError::Cycle(_) => Some("break the dependency cycle named in the error"),
            EngineError::TaskFailure { .. } => None,
            EngineError::Cancelled { .. } => None,
            EngineError::Panicked { .. } => Some("check the task body for an unguarded panic"),
            EngineError::ValidationError { .. } => {
                Some("provide an input value that satisfies the field's validator")
            }
            EngineError::CachePropagatedError { .. } => None,
            EngineError::Other(_) => None,
        }
    }
}

/// Format an error with its fix suggestion, for CLI-style display.
pub fn format_error_with_suggestion(error: &EngineError) -> String {
    let mut out = error.to_string();
    if let Some(suggestion) = error.fix_suggestion() {
        out.push_str("\n  fix: ");
        out.push_str(suggestion);
    }
    out
}

impl fmt::Display for CycleDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" → "))
    }
}

/// Helper used by the resolver to build a readable cycle path before
/// converting it into an [`EngineError::Cycle`].
#[derive(Debug, Clone)]
pub struct CycleDescription(pub Vec<String>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_has_suggestion() {
        let err = EngineError::UnresolvedReference {
            reference: "log-input".into(),
        };
        assert!(err.fix_suggestion().is_some());
        assert!(err.to_string().contains("ENGINE-000"));
    }

    #[test]
    fn cycle_description_formats_with_arrows() {
        let cycle = CycleDescription(vec!["x".into(), "y".into(), "x".into()]);
        assert_eq!(cycle.to_string(), "x → y → x");
    }

    #[test]
    fn fatal_classification() {
        assert!(EngineError::TaskFailure {
            task: "t".into(),
            message: "boom".into()
        }
        .is_fatal_to_run());
        assert!(!EngineError::UnresolvedReference {
            reference: "r".into()
        }
        .is_fatal_to_run());
    }

    #[test]
    fn format_includes_fix_line() {
        let err = EngineError::Cycle("x → y → x".into());
        let formatted = format_error_with_suggestion(&err);
        assert!(formatted.contains("fix:"));
    }
}
