//! Coupling rules — declarative mappings from SLO-violation patterns to
//! backpressure actions.
//!
//! Rules are validated at registration time so a malformed rule can never
//! reach the evaluation loop. The action payload is a tagged enum with one
//! explicit shape per action type.

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::types::{BackpressureConfig, BackpressureOverrides, DegradationLevel, RuleId, SloName};

/// Pattern that matches every registered objective.
pub const WILDCARD_OBJECTIVE: &str = "*";

// ── Priority ───────────────────────────────────────────────────────

/// Rule priority; higher priorities are evaluated first within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    Low,
    Medium,
    High,
    Critical,
}

impl RulePriority {
    /// Cooldown scaling factor. Critical rules cool down fastest so broad
    /// protective actions stay available.
    pub fn cooldown_multiplier(self) -> f64 {
        match self {
            Self::Critical => 0.5,
            Self::High => 0.75,
            Self::Medium => 1.0,
            Self::Low => 1.5,
        }
    }
}

// ── Conditions ─────────────────────────────────────────────────────

/// When a rule fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerCondition {
    /// Objective names this rule watches; `"*"` matches all objectives.
    pub objectives: Vec<SloName>,
    /// Fires when mean remaining budget across matched violations is at or
    /// below this value (0–1).
    pub budget_threshold: f64,
    /// Minimum number of simultaneously violated matched objectives.
    pub min_violations: u32,
    /// Observation window in seconds.
    pub window_secs: u64,
}

/// When a triggered rule may be undone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevertCondition {
    /// Mean budget across implicated objectives must recover to at least
    /// this value (0–1).
    pub budget_recovery: f64,
    /// Minimum seconds since the rule last triggered.
    pub min_delay_secs: u64,
    /// Whether an operator approval must be recorded before reverting.
    pub requires_approval: bool,
}

// ── Actions ────────────────────────────────────────────────────────

/// The backpressure action a rule takes when it fires.
///
/// One explicit variant per action type; there is no generic payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouplingAction {
    /// Merge a partial configuration into the live admission-control config.
    AdjustConfig { overrides: BackpressureOverrides },
    /// Explicitly set the degradation level.
    ForceDegradation { level: DegradationLevel },
    /// Open circuit breakers for the named subjects.
    EnableCircuitBreakers { subjects: Vec<String> },
    /// Apply a full emergency configuration, capturing the prior config
    /// for revert.
    EmergencyMode { config: BackpressureConfig },
}

impl CouplingAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::AdjustConfig { .. } => ActionKind::AdjustConfig,
            Self::ForceDegradation { .. } => ActionKind::ForceDegradation,
            Self::EnableCircuitBreakers { .. } => ActionKind::EnableCircuitBreakers,
            Self::EmergencyMode { .. } => ActionKind::EmergencyMode,
        }
    }
}

/// Discriminant of a [`CouplingAction`], used in audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AdjustConfig,
    ForceDegradation,
    EnableCircuitBreakers,
    EmergencyMode,
}

// ── Rules ──────────────────────────────────────────────────────────

/// Bookkeeping the controller maintains per rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleMetadata {
    /// Unix timestamp of the last successful trigger.
    pub last_triggered: Option<u64>,
    pub trigger_count: u64,
    /// Historical effectiveness score (0–1); ineffective rules are
    /// throttled harder by the cooldown.
    pub effectiveness: f64,
}

impl Default for RuleMetadata {
    fn default() -> Self {
        Self {
            last_triggered: None,
            trigger_count: 0,
            effectiveness: 0.5,
        }
    }
}

/// A declarative coupling rule owned by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouplingRule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub priority: RulePriority,
    pub trigger: TriggerCondition,
    pub action: CouplingAction,
    /// Whether the controller may undo this action on budget recovery.
    pub auto_revert: bool,
    pub revert: RevertCondition,
    #[serde(default)]
    pub metadata: RuleMetadata,
}

impl CouplingRule {
    /// Shape validation performed at registration time.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.trigger.objectives.is_empty() {
            return Err(ValidationError::EmptyObjectiveList);
        }
        if !(0.0..=1.0).contains(&self.trigger.budget_threshold) {
            return Err(ValidationError::BudgetThresholdOutOfRange(
                self.trigger.budget_threshold,
            ));
        }
        if self.trigger.min_violations == 0 {
            return Err(ValidationError::ZeroViolationCount);
        }
        if !(0.0..=1.0).contains(&self.revert.budget_recovery) {
            return Err(ValidationError::RecoveryThresholdOutOfRange(
                self.revert.budget_recovery,
            ));
        }
        match &self.action {
            CouplingAction::EnableCircuitBreakers { subjects } if subjects.is_empty() => {
                return Err(ValidationError::EmptySubjectList);
            }
            CouplingAction::AdjustConfig { overrides } => {
                if let Some(ratio) = overrides.sampling_ratio
                    && !(0.0..=1.0).contains(&ratio)
                {
                    return Err(ValidationError::SamplingRatioOutOfRange(ratio));
                }
            }
            CouplingAction::EmergencyMode { config } => {
                if !(0.0..=1.0).contains(&config.sampling_ratio) {
                    return Err(ValidationError::SamplingRatioOutOfRange(
                        config.sampling_ratio,
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Which registered objectives this rule watches.
    pub fn watched<'a>(&self, all: impl Iterator<Item = &'a SloName>) -> Vec<SloName> {
        all.filter(|name| objective_matches(&self.trigger.objectives, name))
            .cloned()
            .collect()
    }
}

/// Whether `name` is matched by a pattern list.
///
/// A list containing [`WILDCARD_OBJECTIVE`] matches every objective;
/// otherwise matching is exact.
pub fn objective_matches(patterns: &[SloName], name: &str) -> bool {
    patterns
        .iter()
        .any(|p| p == WILDCARD_OBJECTIVE || p == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rule() -> CouplingRule {
        CouplingRule {
            id: "rule-1".to_string(),
            name: "shed load on budget exhaustion".to_string(),
            enabled: true,
            priority: RulePriority::High,
            trigger: TriggerCondition {
                objectives: vec!["api-availability".to_string()],
                budget_threshold: 0.2,
                min_violations: 1,
                window_secs: 300,
            },
            action: CouplingAction::AdjustConfig {
                overrides: BackpressureOverrides {
                    sampling_ratio: Some(0.5),
                    ..Default::default()
                },
            },
            auto_revert: true,
            revert: RevertCondition {
                budget_recovery: 0.5,
                min_delay_secs: 600,
                requires_approval: false,
            },
            metadata: RuleMetadata::default(),
        }
    }

    #[test]
    fn valid_rule_passes() {
        assert_eq!(test_rule().validate(), Ok(()));
    }

    #[test]
    fn empty_objective_list_rejected() {
        let mut rule = test_rule();
        rule.trigger.objectives.clear();
        assert_eq!(rule.validate(), Err(ValidationError::EmptyObjectiveList));
    }

    #[test]
    fn budget_threshold_out_of_range_rejected() {
        let mut rule = test_rule();
        rule.trigger.budget_threshold = 1.5;
        assert_eq!(
            rule.validate(),
            Err(ValidationError::BudgetThresholdOutOfRange(1.5))
        );
    }

    #[test]
    fn zero_min_violations_rejected() {
        let mut rule = test_rule();
        rule.trigger.min_violations = 0;
        assert_eq!(rule.validate(), Err(ValidationError::ZeroViolationCount));
    }

    #[test]
    fn recovery_threshold_out_of_range_rejected() {
        let mut rule = test_rule();
        rule.revert.budget_recovery = -0.1;
        assert_eq!(
            rule.validate(),
            Err(ValidationError::RecoveryThresholdOutOfRange(-0.1))
        );
    }

    #[test]
    fn breaker_action_without_subjects_rejected() {
        let mut rule = test_rule();
        rule.action = CouplingAction::EnableCircuitBreakers { subjects: vec![] };
        assert_eq!(rule.validate(), Err(ValidationError::EmptySubjectList));
    }

    #[test]
    fn bad_sampling_ratio_rejected() {
        let mut rule = test_rule();
        rule.action = CouplingAction::AdjustConfig {
            overrides: BackpressureOverrides {
                sampling_ratio: Some(2.0),
                ..Default::default()
            },
        };
        assert_eq!(
            rule.validate(),
            Err(ValidationError::SamplingRatioOutOfRange(2.0))
        );
    }

    #[test]
    fn wildcard_matches_everything() {
        let patterns = vec![WILDCARD_OBJECTIVE.to_string()];
        assert!(objective_matches(&patterns, "api-availability"));
        assert!(objective_matches(&patterns, "anything"));
    }

    #[test]
    fn exact_match_only_without_wildcard() {
        let patterns = vec!["api-availability".to_string()];
        assert!(objective_matches(&patterns, "api-availability"));
        assert!(!objective_matches(&patterns, "api-latency"));
        assert!(!objective_matches(&patterns, "api"));
    }

    #[test]
    fn empty_pattern_list_matches_nothing() {
        assert!(!objective_matches(&[], "api-availability"));
    }

    #[test]
    fn cooldown_multiplier_ordering() {
        assert!(
            RulePriority::Critical.cooldown_multiplier()
                < RulePriority::High.cooldown_multiplier()
        );
        assert!(
            RulePriority::High.cooldown_multiplier() < RulePriority::Medium.cooldown_multiplier()
        );
        assert!(
            RulePriority::Medium.cooldown_multiplier() < RulePriority::Low.cooldown_multiplier()
        );
    }

    #[test]
    fn priority_sort_order() {
        let mut priorities = vec![
            RulePriority::Low,
            RulePriority::Critical,
            RulePriority::Medium,
            RulePriority::High,
        ];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            priorities,
            vec![
                RulePriority::Critical,
                RulePriority::High,
                RulePriority::Medium,
                RulePriority::Low,
            ]
        );
    }

    #[test]
    fn action_round_trips_through_json_tag() {
        let action = CouplingAction::ForceDegradation {
            level: DegradationLevel::Minimal,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"force_degradation\""));
        let back: CouplingAction = serde_json::from_str(&json).unwrap();
        assert_eq!(action, back);
    }
}
