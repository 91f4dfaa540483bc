//! Shared error type for core validation logic.

/// Errors produced by pure domain logic in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A value failed a domain validation rule.
    #[error("Validation error: {0}")]
    Validation(String),
}
