//! Validation errors for objectives and coupling rules.

use thiserror::Error;

/// Result type alias for registration-time validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised when a malformed objective or rule is registered.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("target percentage must be in 0–100, got {0}")]
    TargetOutOfRange(f64),

    #[error("budget threshold must be in [0, 1], got {0}")]
    BudgetThresholdOutOfRange(f64),

    #[error("budget recovery threshold must be in [0, 1], got {0}")]
    RecoveryThresholdOutOfRange(f64),

    #[error("minimum violation count must be at least 1")]
    ZeroViolationCount,

    #[error("trigger condition names no objectives")]
    EmptyObjectiveList,

    #[error("circuit-breaker action names no subjects")]
    EmptySubjectList,

    #[error("sampling ratio must be in [0, 1], got {0}")]
    SamplingRatioOutOfRange(f64),

    #[error("adjustment factor must be positive, got {0}")]
    AdjustmentFactorOutOfRange(f64),

    #[error("duplicate objective name: {0}")]
    DuplicateObjective(String),

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("unknown objective: {0}")]
    UnknownObjective(String),
}
