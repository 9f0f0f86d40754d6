//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, state transitions). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Applying a decrement would drive a stock level below zero.
    #[error("insufficient stock: available {available}, requested change {delta}")]
    InsufficientStock { available: i64, delta: i64 },

    /// A workflow was asked to make a transition its current status forbids.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The live quantity drifted away from the snapshot an adjustment was counted against.
    #[error("stale adjustment: counted against {snapshot}, live quantity is {live}")]
    StaleAdjustment { snapshot: i64, live: i64 },

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(available: i64, delta: i64) -> Self {
        Self::InsufficientStock { available, delta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_carries_both_figures() {
        let err = DomainError::insufficient_stock(70, -90);
        assert_eq!(
            err.to_string(),
            "insufficient stock: available 70, requested change -90"
        );
    }

    #[test]
    fn constructors_wrap_messages() {
        assert_eq!(
            DomainError::not_found("product 42"),
            DomainError::NotFound("product 42".to_string())
        );
        assert_eq!(
            DomainError::invalid_transition("done -> cancelled"),
            DomainError::InvalidTransition("done -> cancelled".to_string())
        );
    }
}
