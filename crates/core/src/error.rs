use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Concurrent modification of {entity} with id {id}")]
    ConcurrencyConflict { entity: &'static str, id: DbId },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a validation failure with a single violation.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    /// Whether the caller may safely retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::ConcurrencyConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_violations() {
        let err = CoreError::Validation(vec!["name is required".into(), "step 2: bad".into()]);
        assert_eq!(
            err.to_string(),
            "Validation failed: name is required; step 2: bad"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(CoreError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(CoreError::ConcurrencyConflict {
            entity: "Assignment",
            id: 1
        }
        .is_retryable());
        assert!(!CoreError::InvalidState("completed".into()).is_retryable());
        assert!(!CoreError::validation("x").is_retryable());
    }
}
