//! Metric backend abstraction.
//!
//! The governor treats metric evaluation as an abstract, possibly-failing,
//! bounded-time call. How metrics are collected and what query language
//! backs an objective are out of scope.

use std::collections::HashMap;

use thiserror::Error;

use slogrid_types::ServiceLevelObjective;

/// Boxed future returned by metric queries.
pub type MetricFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<f64, MetricError>> + Send>>;

/// Errors from the metric backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("metric backend unavailable: {0}")]
    Unavailable(String),

    #[error("no data for query: {0}")]
    NoData(String),

    #[error("malformed query: {0}")]
    BadQuery(String),
}

/// Source of compliance measurements for objectives.
///
/// Implementations must be cheap to call; the evaluator wraps every query
/// in its own timeout and never retries within a tick.
pub trait MetricBackend: Send + Sync {
    /// Measured compliance percentage (0–100) for the objective's query.
    fn query_compliance(&self, slo: &ServiceLevelObjective) -> MetricFuture;
}

/// Fixed compliance values keyed by objective name.
///
/// Used by the demo daemon and tests; unknown objectives report
/// [`MetricError::NoData`].
#[derive(Debug, Clone, Default)]
pub struct StaticBackend {
    values: HashMap<String, f64>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, objective: &str, compliance_pct: f64) -> Self {
        self.values.insert(objective.to_string(), compliance_pct);
        self
    }

    pub fn set(&mut self, objective: &str, compliance_pct: f64) {
        self.values.insert(objective.to_string(), compliance_pct);
    }
}

impl MetricBackend for StaticBackend {
    fn query_compliance(&self, slo: &ServiceLevelObjective) -> MetricFuture {
        let result = match self.values.get(&slo.name) {
            Some(value) => Ok(*value),
            None => Err(MetricError::NoData(slo.query.clone())),
        };
        Box::pin(async move { result })
    }
}
