//! Coupling controller error types.

use thiserror::Error;

/// Errors from rule registration and controller operations.
#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("validation error: {0}")]
    Validation(#[from] slogrid_types::ValidationError),

    #[error("backpressure controller error: {0}")]
    Controller(#[from] anyhow::Error),
}
