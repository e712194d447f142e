//! slogrid-types — shared domain types for the SLO governor.
//!
//! Objectives, compliance samples, coupling rules, backpressure
//! configuration, and action records. All types are serializable to/from
//! JSON so they can cross config, reporting, and audit boundaries.

pub mod budget;
pub mod error;
pub mod rule;
pub mod types;

pub use budget::error_budget;
pub use error::{ValidationError, ValidationResult};
pub use rule::{
    objective_matches, ActionKind, CouplingAction, CouplingRule, RevertCondition, RuleMetadata,
    RulePriority, TriggerCondition, WILDCARD_OBJECTIVE,
};
pub use types::*;
