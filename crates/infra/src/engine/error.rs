use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

/// Errors surfaced by the movement engine and the workflows layered on it.
///
/// Every variant leaves stock levels and the ledger unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or missing input; rejected before any lock is taken.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown product, location, transfer or adjustment.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock: available {available}, requested change {delta}")]
    InsufficientStock { available: i64, delta: i64 },

    /// Lock contention that outlasted the internal retries.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale adjustment: counted against {snapshot}, live quantity is {live}")]
    StaleAdjustment { snapshot: i64, live: i64 },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A domain invariant or the store protocol was violated.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Opaque storage failure, surfaced unmodified.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Only lock contention is retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::Conflict(_) => "conflict",
            EngineError::StaleAdjustment { .. } => "stale_adjustment",
            EngineError::NothingToUndo => "nothing_to_undo",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::Invariant(_) => "invariant_violation",
            EngineError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => EngineError::Invariant(msg),
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::InsufficientStock { available, delta } => {
                EngineError::InsufficientStock { available, delta }
            }
            DomainError::InvalidTransition(msg) => EngineError::InvalidTransition(msg),
            DomainError::StaleAdjustment { snapshot, live } => {
                EngineError::StaleAdjustment { snapshot, live }
            }
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::Persistence(msg) => EngineError::Persistence(msg),
            StoreError::InvalidState(msg) => EngineError::Invariant(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(EngineError::from(StoreError::Conflict("lock".into())).is_retryable());
        assert!(!EngineError::from(DomainError::insufficient_stock(1, -2)).is_retryable());
        assert!(!EngineError::Persistence("disk".into()).is_retryable());
    }

    #[test]
    fn domain_errors_keep_their_category() {
        assert_eq!(
            EngineError::from(DomainError::invalid_id("ProductId: bad")),
            EngineError::Validation("ProductId: bad".to_string())
        );
        assert_eq!(
            EngineError::from(DomainError::StaleAdjustment { snapshot: 50, live: 60 }).code(),
            "stale_adjustment"
        );
    }
}
