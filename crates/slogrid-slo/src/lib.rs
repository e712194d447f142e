//! slogrid-slo — SLO registry and evaluation.
//!
//! Holds the immutable objective registry, queries an abstract metric
//! backend for per-objective compliance on each tick, derives remaining
//! error budget, and maintains time-bounded adaptive target overrides.
//!
//! # Evaluation
//!
//! ```text
//! for each objective (concurrently, each with a bounded timeout):
//!     compliance = backend.query_compliance(objective)
//!     on timeout/failure: compliance = 50.0   // assume partially degraded
//!     target     = adaptive override if active, else declared target
//!     budget     = error_budget(target, compliance)
//! health_score = mean(compliance)
//! ```
//!
//! A failed query never aborts the tick and is never silently skipped:
//! the conservative default keeps downstream rules able to react to an
//! unmeasurable subsystem.

pub mod adaptive;
pub mod backend;
pub mod evaluator;
pub mod registry;

pub use adaptive::AdaptiveThresholdManager;
pub use backend::{MetricBackend, MetricError, MetricFuture, StaticBackend};
pub use evaluator::{SloEvaluator, DEGRADED_COMPLIANCE_PCT};
pub use registry::{SloRegistry, SloRegistryBuilder};
