//! Domain types for the SLO governor.
//!
//! These types describe the declared objectives, the per-tick compliance
//! state derived from them, and the admission-control configuration owned
//! by the external backpressure controller.

use serde::{Deserialize, Serialize};

/// Unique name of a service-level objective.
pub type SloName = String;

/// Unique identifier for a coupling rule.
pub type RuleId = String;

// ── Objectives ─────────────────────────────────────────────────────

/// Severity of an objective, used for alert classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloSeverity {
    Info,
    Warning,
    Critical,
}

/// A declared service-level objective.
///
/// Immutable after registration: the registry hands out references, and
/// temporary target changes go through adaptive thresholds instead of
/// mutating the objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceLevelObjective {
    pub name: SloName,
    pub description: String,
    /// Target compliance percentage (0–100).
    pub target_pct: f64,
    /// Evaluation window in seconds.
    pub window_secs: u64,
    pub severity: SloSeverity,
    /// Opaque reference to the metric query backing this objective.
    pub query: String,
}

// ── Compliance ─────────────────────────────────────────────────────

/// Point-in-time compliance measurement for one objective.
///
/// The latest sample per objective overwrites the previous one; the
/// evaluator keeps no history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceSample {
    pub objective: SloName,
    /// Unix timestamp (seconds) when this sample was taken.
    pub epoch: u64,
    /// Measured compliance percentage (0–100).
    pub compliance_pct: f64,
    /// Remaining error budget in [0, 1].
    pub error_budget: f64,
}

/// An objective currently below its effective target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SloViolation {
    pub objective: SloName,
    pub compliance_pct: f64,
    /// The target that was violated (adaptive override if one was active).
    pub target_pct: f64,
    pub severity: SloSeverity,
}

/// Result of one full evaluation pass over the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOutcome {
    pub epoch: u64,
    /// Average compliance across all objectives (0–100).
    pub health_score: f64,
    pub samples: Vec<ComplianceSample>,
    pub violations: Vec<SloViolation>,
    /// Human-readable alerts for critical-severity violations.
    pub critical_alerts: Vec<String>,
    /// Objectives whose metric query failed or timed out this tick and
    /// were defaulted to the degraded compliance value.
    pub query_failures: Vec<SloName>,
}

impl EvaluationOutcome {
    /// Look up the latest sample for an objective in this outcome.
    pub fn sample(&self, objective: &str) -> Option<&ComplianceSample> {
        self.samples.iter().find(|s| s.objective == objective)
    }

    /// Whether the named objective is in violation in this outcome.
    pub fn is_violated(&self, objective: &str) -> bool {
        self.violations.iter().any(|v| v.objective == objective)
    }
}

// ── Adaptive thresholds ────────────────────────────────────────────

/// A time-bounded override of an objective's effective target.
///
/// Expired entries are excluded lazily at lookup time; storage is not
/// actively purged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveThreshold {
    pub objective: SloName,
    pub original_target: f64,
    pub adaptive_target: f64,
    /// Multiplier applied to the original target.
    pub adjustment_factor: f64,
    pub reason: String,
    /// Unix timestamp (seconds) after which this override is ignored.
    pub expires_at: u64,
    /// Trust in this override (0–1); smaller adjustments score higher.
    pub confidence: f64,
}

impl AdaptiveThreshold {
    /// Whether the override is still in effect at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

// ── Backpressure configuration ─────────────────────────────────────

/// Discrete setting of how aggressively admission control throttles work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Normal,
    Reduced,
    Minimal,
    Emergency,
}

/// Live admission-control configuration owned by the external
/// backpressure controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackpressureConfig {
    /// Maximum queued publish jobs before rejection.
    pub max_queue_depth: u32,
    /// Publish-rate cap in operations per second.
    pub publish_rate_limit: f64,
    /// Fraction of non-essential work admitted (0–1).
    pub sampling_ratio: f64,
    /// Consecutive failures before a circuit breaker opens.
    pub breaker_failure_threshold: u32,
    pub degradation: DegradationLevel,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 10_000,
            publish_rate_limit: 100.0,
            sampling_ratio: 1.0,
            breaker_failure_threshold: 5,
            degradation: DegradationLevel::Normal,
        }
    }
}

impl BackpressureConfig {
    /// The full configuration expressed as an override of every field.
    ///
    /// Used to restore a captured prior configuration on revert.
    pub fn as_overrides(&self) -> BackpressureOverrides {
        BackpressureOverrides {
            max_queue_depth: Some(self.max_queue_depth),
            publish_rate_limit: Some(self.publish_rate_limit),
            sampling_ratio: Some(self.sampling_ratio),
            breaker_failure_threshold: Some(self.breaker_failure_threshold),
            degradation: Some(self.degradation),
        }
    }

    /// Merge a partial override into this configuration.
    pub fn apply(&mut self, overrides: &BackpressureOverrides) {
        if let Some(depth) = overrides.max_queue_depth {
            self.max_queue_depth = depth;
        }
        if let Some(rate) = overrides.publish_rate_limit {
            self.publish_rate_limit = rate;
        }
        if let Some(ratio) = overrides.sampling_ratio {
            self.sampling_ratio = ratio;
        }
        if let Some(threshold) = overrides.breaker_failure_threshold {
            self.breaker_failure_threshold = threshold;
        }
        if let Some(level) = overrides.degradation {
            self.degradation = level;
        }
    }
}

/// Partial admission-control configuration; `None` fields are left as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackpressureOverrides {
    pub max_queue_depth: Option<u32>,
    pub publish_rate_limit: Option<f64>,
    pub sampling_ratio: Option<f64>,
    pub breaker_failure_threshold: Option<u32>,
    pub degradation: Option<DegradationLevel>,
}

/// Point-in-time view of the external strategy manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategySnapshot {
    pub degradation: DegradationLevel,
    /// Estimated fraction of error budget being consumed (0–1).
    pub budget_consumption: f64,
}

// ── Audit ──────────────────────────────────────────────────────────

/// Outcome of a dispatched or reverted action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Triggered,
    TriggerFailed { error: String },
    Reverted,
    RevertFailed { error: String },
}

/// Compact snapshot of the evaluation that caused a trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerSnapshot {
    pub health_score: f64,
    /// Objectives in violation that matched the rule.
    pub violated: Vec<SloName>,
    /// Mean remaining budget across the matched objectives.
    pub mean_budget: f64,
}

/// One entry in the bounded action history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub epoch: u64,
    pub rule_id: RuleId,
    pub kind: crate::rule::ActionKind,
    pub outcome: ActionOutcome,
    pub snapshot: TriggerSnapshot,
}

/// Aggregate view over the rule set, recomputed every tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CouplingMetrics {
    pub enabled_rules: usize,
    pub active_rules: usize,
    pub avg_effectiveness: f64,
}
