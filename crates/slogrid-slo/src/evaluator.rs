//! SLO evaluator — per-tick compliance measurement.
//!
//! Queries the metric backend for every registered objective, derives
//! remaining error budget, and publishes the current snapshot. Queries run
//! concurrently, each under its own timeout; the caller's tick does not
//! proceed until every query has completed or timed out, so downstream
//! rule evaluation never sees a half-updated snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use slogrid_types::{
    error_budget, ComplianceSample, EvaluationOutcome, SloName, SloSeverity, SloViolation,
};

use crate::adaptive::AdaptiveThresholdManager;
use crate::backend::MetricBackend;
use crate::registry::SloRegistry;

/// Compliance assumed for an objective whose query failed or timed out.
///
/// Deliberately conservative: an unmeasurable subsystem is treated as
/// partially degraded rather than invisible, so rules can still react.
pub const DEGRADED_COMPLIANCE_PCT: f64 = 50.0;

/// Evaluates all registered objectives and maintains the current
/// compliance snapshot (single writer: the governor tick).
pub struct SloEvaluator {
    registry: Arc<SloRegistry>,
    backend: Arc<dyn MetricBackend>,
    /// Bound on each per-objective metric query.
    query_timeout: Duration,
    /// Latest sample per objective; overwritten every tick, no history.
    current: HashMap<SloName, ComplianceSample>,
}

impl SloEvaluator {
    pub fn new(
        registry: Arc<SloRegistry>,
        backend: Arc<dyn MetricBackend>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            backend,
            query_timeout,
            current: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &SloRegistry {
        &self.registry
    }

    /// Read-only copy of the latest sample for one objective.
    pub fn current_sample(&self, objective: &str) -> Option<ComplianceSample> {
        self.current.get(objective).cloned()
    }

    /// Read-only copy of the whole current snapshot.
    pub fn current_snapshot(&self) -> Vec<ComplianceSample> {
        let mut samples: Vec<_> = self.current.values().cloned().collect();
        samples.sort_by(|a, b| a.objective.cmp(&b.objective));
        samples
    }

    /// Evaluate every registered objective and update the snapshot.
    ///
    /// One objective's failure never aborts the rest; failed queries
    /// default to [`DEGRADED_COMPLIANCE_PCT`]. No retries within a tick —
    /// a failed evaluation is simply retried on the next one.
    pub async fn evaluate_all(
        &mut self,
        thresholds: &AdaptiveThresholdManager,
        now: u64,
    ) -> EvaluationOutcome {
        let mut queries = JoinSet::new();
        for slo in self.registry.iter() {
            let name = slo.name.clone();
            let future = self.backend.query_compliance(slo);
            let timeout = self.query_timeout;
            queries.spawn(async move {
                let result = tokio::time::timeout(timeout, future).await;
                (name, result)
            });
        }

        let mut measured: HashMap<SloName, f64> = HashMap::new();
        let mut query_failures = Vec::new();
        while let Some(joined) = queries.join_next().await {
            let Ok((name, result)) = joined else {
                // Query task panicked; the objective falls through to the
                // degraded default below.
                continue;
            };
            let compliance = match result {
                Ok(Ok(value)) => value.clamp(0.0, 100.0),
                Ok(Err(e)) => {
                    warn!(objective = %name, error = %e, "metric query failed, assuming degraded");
                    query_failures.push(name.clone());
                    DEGRADED_COMPLIANCE_PCT
                }
                Err(_) => {
                    warn!(
                        objective = %name,
                        timeout_ms = self.query_timeout.as_millis() as u64,
                        "metric query timed out, assuming degraded"
                    );
                    query_failures.push(name.clone());
                    DEGRADED_COMPLIANCE_PCT
                }
            };
            measured.insert(name, compliance);
        }
        query_failures.sort();

        let mut samples = Vec::with_capacity(self.registry.len());
        let mut violations = Vec::new();
        let mut critical_alerts = Vec::new();
        let mut compliance_sum = 0.0;

        // Assemble in stable registry order.
        for slo in self.registry.iter() {
            let compliance = measured
                .get(&slo.name)
                .copied()
                .unwrap_or(DEGRADED_COMPLIANCE_PCT);
            let target = thresholds.effective_target(slo, now);
            let budget = error_budget(target, compliance);
            compliance_sum += compliance;

            let sample = ComplianceSample {
                objective: slo.name.clone(),
                epoch: now,
                compliance_pct: compliance,
                error_budget: budget,
            };
            self.current.insert(slo.name.clone(), sample.clone());
            samples.push(sample);

            if compliance < target {
                debug!(
                    objective = %slo.name,
                    compliance,
                    target,
                    "objective in violation"
                );
                if slo.severity == SloSeverity::Critical {
                    critical_alerts.push(format!(
                        "CRITICAL: {} at {compliance:.2}% (target {target:.2}%)",
                        slo.name
                    ));
                }
                violations.push(SloViolation {
                    objective: slo.name.clone(),
                    compliance_pct: compliance,
                    target_pct: target,
                    severity: slo.severity,
                });
            }
        }

        let health_score = if samples.is_empty() {
            100.0
        } else {
            compliance_sum / samples.len() as f64
        };

        EvaluationOutcome {
            epoch: now,
            health_score,
            samples,
            violations,
            critical_alerts,
            query_failures,
        }
    }
}
