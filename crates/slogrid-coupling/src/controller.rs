//! Coupling controller — rule lifecycle, triggering, and reverting.
//!
//! Rules are evaluated once per tick in descending priority order, so a
//! broad action (an emergency-mode rule) is applied before a narrower one
//! is evaluated against the same tick's data. Revert eligibility for
//! already-triggered rules is checked separately.
//!
//! A rule transitions to "triggered" only through a successful dispatch;
//! a failed dispatch is recorded and stays retryable on the next tick.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use slogrid_types::{
    objective_matches, ActionOutcome, ActionRecord, BackpressureConfig, BackpressureOverrides,
    CouplingAction, CouplingMetrics, CouplingRule, EvaluationOutcome, RuleId, RulePriority,
    SloName, TriggerSnapshot, ValidationError,
};

use crate::backpressure::BackpressureHandle;
use crate::error::CouplingError;
use crate::events::{EventBus, GovernorEvent};
use crate::history::ActionHistory;

/// Cooldown before a rule may fire again.
///
/// Base duration scaled by an inverse priority multiplier (critical rules
/// cool down fastest) and by `(2 − effectiveness)`, so historically
/// ineffective rules are throttled harder.
pub fn cooldown_duration(base: Duration, priority: RulePriority, effectiveness: f64) -> Duration {
    let factor = priority.cooldown_multiplier() * (2.0 - effectiveness.clamp(0.0, 1.0));
    base.mul_f64(factor)
}

/// How to undo a dispatched action on revert.
#[derive(Debug, Clone)]
enum UndoPlan {
    /// Restore the full captured prior configuration.
    RestoreConfig(BackpressureConfig),
    /// Restore the captured prior degradation level.
    RestoreDegradation(slogrid_types::DegradationLevel),
    /// Close the breakers this action opened.
    CloseBreakers(Vec<String>),
}

/// Bookkeeping for a rule whose action is currently applied.
#[derive(Debug, Clone)]
struct ActiveAction {
    /// Objectives matched by the rule's trigger at activation time.
    implicated: Vec<SloName>,
    /// Captured at first activation; a re-trigger does not overwrite it,
    /// so revert restores the configuration from before the rule fired
    /// at all.
    undo: UndoPlan,
}

/// The rule engine coupling SLO state to backpressure actions.
///
/// External callers mutate rules only through the registration
/// operations here; rule metadata is never touched directly.
pub struct CouplingController {
    rules: BTreeMap<RuleId, CouplingRule>,
    active: HashMap<RuleId, ActiveAction>,
    /// Operator approvals for rules whose revert requires one; consumed
    /// on successful revert.
    approvals: HashSet<RuleId>,
    history: ActionHistory,
    backpressure: Arc<dyn BackpressureHandle>,
    events: EventBus,
    base_cooldown: Duration,
}

impl CouplingController {
    pub fn new(
        backpressure: Arc<dyn BackpressureHandle>,
        events: EventBus,
        base_cooldown: Duration,
        history_cap: usize,
    ) -> Self {
        Self {
            rules: BTreeMap::new(),
            active: HashMap::new(),
            approvals: HashSet::new(),
            history: ActionHistory::with_cap(history_cap),
            backpressure,
            events,
            base_cooldown,
        }
    }

    // ── Registration operations ────────────────────────────────────

    /// Register a rule, validating its shape first.
    pub fn add_rule(&mut self, rule: CouplingRule) -> Result<(), CouplingError> {
        rule.validate()?;
        if self.rules.contains_key(&rule.id) {
            return Err(ValidationError::DuplicateRule(rule.id).into());
        }
        info!(rule = %rule.id, name = %rule.name, priority = ?rule.priority, "rule added");
        self.events.emit(GovernorEvent::RuleAdded {
            rule_id: rule.id.clone(),
        });
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Remove a rule. An applied action is left in place; reverting it
    /// becomes a manual concern.
    pub fn remove_rule(&mut self, rule_id: &str) -> Result<CouplingRule, CouplingError> {
        let rule = self
            .rules
            .remove(rule_id)
            .ok_or_else(|| CouplingError::RuleNotFound(rule_id.to_string()))?;
        self.active.remove(rule_id);
        self.approvals.remove(rule_id);
        info!(rule = %rule_id, "rule removed");
        self.events.emit(GovernorEvent::RuleRemoved {
            rule_id: rule_id.to_string(),
        });
        Ok(rule)
    }

    pub fn set_rule_enabled(&mut self, rule_id: &str, enabled: bool) -> Result<(), CouplingError> {
        let rule = self
            .rules
            .get_mut(rule_id)
            .ok_or_else(|| CouplingError::RuleNotFound(rule_id.to_string()))?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Record an operator approval for a revert that requires one.
    pub fn approve_revert(&mut self, rule_id: &str) -> Result<(), CouplingError> {
        if !self.rules.contains_key(rule_id) {
            return Err(CouplingError::RuleNotFound(rule_id.to_string()));
        }
        info!(rule = %rule_id, "revert approved");
        self.approvals.insert(rule_id.to_string());
        Ok(())
    }

    pub fn list_rules(&self) -> Vec<CouplingRule> {
        self.rules.values().cloned().collect()
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<&CouplingRule> {
        self.rules.get(rule_id)
    }

    /// Whether the rule's action is currently applied.
    pub fn is_active(&self, rule_id: &str) -> bool {
        self.active.contains_key(rule_id)
    }

    /// The most recent `limit` action records, newest first.
    pub fn action_history(&self, limit: usize) -> Vec<ActionRecord> {
        self.history.recent(limit)
    }

    /// Aggregate rule-set metrics, recomputed on demand.
    pub fn coupling_metrics(&self) -> CouplingMetrics {
        let avg_effectiveness = if self.rules.is_empty() {
            0.0
        } else {
            self.rules
                .values()
                .map(|r| r.metadata.effectiveness)
                .sum::<f64>()
                / self.rules.len() as f64
        };
        CouplingMetrics {
            enabled_rules: self.rules.values().filter(|r| r.enabled).count(),
            active_rules: self.active.len(),
            avg_effectiveness,
        }
    }

    // ── Trigger evaluation ─────────────────────────────────────────

    /// Evaluate every enabled rule against a fresh compliance snapshot.
    ///
    /// Rules run sequentially in descending priority order; ties break on
    /// rule id for determinism. Returns the ids of rules that triggered.
    pub async fn evaluate(&mut self, outcome: &EvaluationOutcome, now: u64) -> Vec<RuleId> {
        let mut order: Vec<(RulePriority, RuleId)> = self
            .rules
            .values()
            .filter(|r| r.enabled)
            .map(|r| (r.priority, r.id.clone()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut triggered = Vec::new();
        for (_, rule_id) in order {
            if self.evaluate_rule(&rule_id, outcome, now).await {
                triggered.push(rule_id);
            }
        }
        triggered
    }

    async fn evaluate_rule(&mut self, rule_id: &str, outcome: &EvaluationOutcome, now: u64) -> bool {
        let Some(rule) = self.rules.get(rule_id) else {
            return false;
        };

        let implicated: Vec<SloName> = outcome
            .samples
            .iter()
            .filter(|s| objective_matches(&rule.trigger.objectives, &s.objective))
            .map(|s| s.objective.clone())
            .collect();

        let violated: Vec<SloName> = implicated
            .iter()
            .filter(|name| outcome.is_violated(name))
            .cloned()
            .collect();

        if (violated.len() as u32) < rule.trigger.min_violations {
            return false;
        }

        let mean_budget = mean_budget(outcome, &implicated);
        if mean_budget > rule.trigger.budget_threshold {
            return false;
        }

        // Cooldown gate.
        if let Some(last) = rule.metadata.last_triggered {
            let cooldown = cooldown_duration(
                self.base_cooldown,
                rule.priority,
                rule.metadata.effectiveness,
            );
            if now.saturating_sub(last) < cooldown.as_secs() {
                debug!(rule = %rule_id, "inside cooldown, skipping");
                return false;
            }
        }

        let action = rule.action.clone();
        let was_active = self.active.contains_key(rule_id);
        let snapshot = TriggerSnapshot {
            health_score: outcome.health_score,
            violated: violated.clone(),
            mean_budget,
        };

        match self.dispatch(&action).await {
            Ok(undo) => {
                if let Some(rule) = self.rules.get_mut(rule_id) {
                    rule.metadata.last_triggered = Some(now);
                    rule.metadata.trigger_count += 1;
                    if was_active {
                        // Firing again while still applied means the action
                        // did not hold the line.
                        rule.metadata.effectiveness =
                            (rule.metadata.effectiveness - 0.1).max(0.0);
                    }
                }
                // Keep the original undo capture across re-triggers.
                self.active
                    .entry(rule_id.to_string())
                    .or_insert(ActiveAction { implicated, undo });

                info!(
                    rule = %rule_id,
                    kind = ?action.kind(),
                    violations = violated.len(),
                    mean_budget,
                    "rule triggered"
                );
                self.history.push(ActionRecord {
                    epoch: now,
                    rule_id: rule_id.to_string(),
                    kind: action.kind(),
                    outcome: ActionOutcome::Triggered,
                    snapshot,
                });
                self.events.emit(GovernorEvent::RuleTriggered {
                    rule_id: rule_id.to_string(),
                    kind: action.kind(),
                });
                true
            }
            Err(error) => {
                // Eligible to retry next tick; last_triggered untouched.
                warn!(rule = %rule_id, %error, "action dispatch failed");
                self.history.push(ActionRecord {
                    epoch: now,
                    rule_id: rule_id.to_string(),
                    kind: action.kind(),
                    outcome: ActionOutcome::TriggerFailed {
                        error: error.clone(),
                    },
                    snapshot,
                });
                self.events.emit(GovernorEvent::TriggerFailed {
                    rule_id: rule_id.to_string(),
                    error,
                });
                false
            }
        }
    }

    /// Apply an action to the external controller, capturing what is
    /// needed to undo it.
    async fn dispatch(&self, action: &CouplingAction) -> Result<UndoPlan, String> {
        match action {
            CouplingAction::AdjustConfig { overrides } => {
                let prior = self
                    .backpressure
                    .get_config()
                    .await
                    .map_err(|e| e.to_string())?;
                self.backpressure
                    .update_config(overrides.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(UndoPlan::RestoreConfig(prior))
            }
            CouplingAction::ForceDegradation { level } => {
                let prior = self
                    .backpressure
                    .get_config()
                    .await
                    .map_err(|e| e.to_string())?;
                self.backpressure
                    .update_config(BackpressureOverrides {
                        degradation: Some(*level),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(UndoPlan::RestoreDegradation(prior.degradation))
            }
            CouplingAction::EnableCircuitBreakers { subjects } => {
                let mut opened = Vec::with_capacity(subjects.len());
                for subject in subjects {
                    self.backpressure
                        .open_circuit_breaker(subject)
                        .await
                        .map_err(|e| e.to_string())?;
                    opened.push(subject.clone());
                }
                Ok(UndoPlan::CloseBreakers(opened))
            }
            CouplingAction::EmergencyMode { config } => {
                let prior = self
                    .backpressure
                    .get_config()
                    .await
                    .map_err(|e| e.to_string())?;
                self.backpressure
                    .update_config(config.as_overrides())
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(UndoPlan::RestoreConfig(prior))
            }
        }
    }

    // ── Revert evaluation ──────────────────────────────────────────

    /// Check every active auto-revert rule against the current snapshot.
    ///
    /// A rule reverts only when all conditions hold: time elapsed since
    /// the last trigger, budget recovered across the implicated
    /// objectives, and an approval if one is required. A failed revert is
    /// logged and retried later; the original action is never re-applied.
    pub async fn check_reverts(&mut self, outcome: &EvaluationOutcome, now: u64) -> Vec<RuleId> {
        let mut candidates: Vec<RuleId> = self.active.keys().cloned().collect();
        candidates.sort();

        let mut reverted = Vec::new();
        for rule_id in candidates {
            if self.check_revert_rule(&rule_id, outcome, now).await {
                reverted.push(rule_id);
            }
        }
        reverted
    }

    async fn check_revert_rule(
        &mut self,
        rule_id: &str,
        outcome: &EvaluationOutcome,
        now: u64,
    ) -> bool {
        let Some(rule) = self.rules.get(rule_id) else {
            return false;
        };
        if !rule.auto_revert {
            return false;
        }
        let Some(active) = self.active.get(rule_id) else {
            return false;
        };

        let Some(last) = rule.metadata.last_triggered else {
            return false;
        };
        if now.saturating_sub(last) < rule.revert.min_delay_secs {
            return false;
        }

        if mean_budget(outcome, &active.implicated) < rule.revert.budget_recovery {
            return false;
        }

        if rule.revert.requires_approval && !self.approvals.contains(rule_id) {
            debug!(rule = %rule_id, "revert eligible but awaiting approval");
            return false;
        }

        let kind = rule.action.kind();
        let undo = active.undo.clone();
        match self.undo(&undo).await {
            Ok(()) => {
                self.active.remove(rule_id);
                self.approvals.remove(rule_id);
                if let Some(rule) = self.rules.get_mut(rule_id) {
                    // Budget recovered under the action: count it effective.
                    rule.metadata.effectiveness =
                        (rule.metadata.effectiveness + 0.1).min(1.0);
                }
                info!(rule = %rule_id, "rule reverted");
                self.history.push(ActionRecord {
                    epoch: now,
                    rule_id: rule_id.to_string(),
                    kind,
                    outcome: ActionOutcome::Reverted,
                    snapshot: TriggerSnapshot {
                        health_score: outcome.health_score,
                        violated: vec![],
                        mean_budget: mean_budget(outcome, &[]),
                    },
                });
                self.events.emit(GovernorEvent::RuleReverted {
                    rule_id: rule_id.to_string(),
                });
                true
            }
            Err(error) => {
                warn!(rule = %rule_id, %error, "revert failed, requires follow-up");
                self.history.push(ActionRecord {
                    epoch: now,
                    rule_id: rule_id.to_string(),
                    kind,
                    outcome: ActionOutcome::RevertFailed {
                        error: error.clone(),
                    },
                    snapshot: TriggerSnapshot {
                        health_score: outcome.health_score,
                        violated: vec![],
                        mean_budget: 0.0,
                    },
                });
                self.events.emit(GovernorEvent::RevertFailed {
                    rule_id: rule_id.to_string(),
                    error,
                });
                false
            }
        }
    }

    async fn undo(&self, plan: &UndoPlan) -> Result<(), String> {
        match plan {
            UndoPlan::RestoreConfig(prior) => self
                .backpressure
                .update_config(prior.as_overrides())
                .await
                .map_err(|e| e.to_string()),
            UndoPlan::RestoreDegradation(level) => self
                .backpressure
                .update_config(BackpressureOverrides {
                    degradation: Some(*level),
                    ..Default::default()
                })
                .await
                .map_err(|e| e.to_string()),
            UndoPlan::CloseBreakers(subjects) => {
                for subject in subjects {
                    self.backpressure
                        .close_circuit_breaker(subject)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Ok(())
            }
        }
    }
}

/// Mean remaining budget across the named objectives in this outcome.
///
/// Objectives missing from the snapshot contribute nothing; an empty set
/// reports a full budget so it can never satisfy a trigger threshold
/// below 1.
fn mean_budget(outcome: &EvaluationOutcome, objectives: &[SloName]) -> f64 {
    let budgets: Vec<f64> = objectives
        .iter()
        .filter_map(|name| outcome.sample(name).map(|s| s.error_budget))
        .collect();
    if budgets.is_empty() {
        return 1.0;
    }
    budgets.iter().sum::<f64>() / budgets.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::{ControlFuture, InMemoryController};
    use slogrid_types::{
        ComplianceSample, DegradationLevel, RevertCondition, RuleMetadata, SloSeverity,
        SloViolation, TriggerCondition,
    };

    fn sample(objective: &str, compliance: f64, budget: f64) -> ComplianceSample {
        ComplianceSample {
            objective: objective.to_string(),
            epoch: 1000,
            compliance_pct: compliance,
            error_budget: budget,
        }
    }

    fn violation(objective: &str, compliance: f64) -> SloViolation {
        SloViolation {
            objective: objective.to_string(),
            compliance_pct: compliance,
            target_pct: 95.0,
            severity: SloSeverity::Warning,
        }
    }

    /// Outcome with one violated objective ("api", budget 0) and one
    /// healthy objective ("publish", budget 0.9).
    fn degraded_outcome() -> EvaluationOutcome {
        EvaluationOutcome {
            epoch: 1000,
            health_score: 80.0,
            samples: vec![sample("api", 90.0, 0.0), sample("publish", 99.5, 0.9)],
            violations: vec![violation("api", 90.0)],
            critical_alerts: vec![],
            query_failures: vec![],
        }
    }

    /// Outcome where everything has recovered.
    fn recovered_outcome(epoch: u64) -> EvaluationOutcome {
        EvaluationOutcome {
            epoch,
            health_score: 99.0,
            samples: vec![sample("api", 99.5, 0.9), sample("publish", 99.5, 0.9)],
            violations: vec![],
            critical_alerts: vec![],
            query_failures: vec![],
        }
    }

    fn test_rule(id: &str, priority: RulePriority) -> CouplingRule {
        CouplingRule {
            id: id.to_string(),
            name: format!("{id} rule"),
            enabled: true,
            priority,
            trigger: TriggerCondition {
                objectives: vec!["api".to_string()],
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
                min_delay_secs: 60,
                requires_approval: false,
            },
            metadata: RuleMetadata::default(),
        }
    }

    fn controller_with(backpressure: Arc<dyn BackpressureHandle>) -> CouplingController {
        CouplingController::new(backpressure, EventBus::default(), Duration::from_secs(300), 1000)
    }

    /// Handle whose mutations always fail.
    struct FailingHandle;

    impl BackpressureHandle for FailingHandle {
        fn update_config(&self, _overrides: BackpressureOverrides) -> ControlFuture<()> {
            Box::pin(async { anyhow::bail!("controller unreachable") })
        }
        fn get_config(&self) -> ControlFuture<BackpressureConfig> {
            Box::pin(async { Ok(BackpressureConfig::default()) })
        }
        fn open_circuit_breaker(&self, _subject: &str) -> ControlFuture<()> {
            Box::pin(async { anyhow::bail!("controller unreachable") })
        }
        fn close_circuit_breaker(&self, _subject: &str) -> ControlFuture<()> {
            Box::pin(async { anyhow::bail!("controller unreachable") })
        }
    }

    #[test]
    fn cooldown_scales_with_priority_and_effectiveness() {
        let base = Duration::from_secs(300);

        // Lower priority → longer cooldown, other factors fixed.
        let critical = cooldown_duration(base, RulePriority::Critical, 0.5);
        let high = cooldown_duration(base, RulePriority::High, 0.5);
        let medium = cooldown_duration(base, RulePriority::Medium, 0.5);
        let low = cooldown_duration(base, RulePriority::Low, 0.5);
        assert!(critical < high && high < medium && medium < low);

        // Lower effectiveness → longer cooldown, other factors fixed.
        let effective = cooldown_duration(base, RulePriority::Medium, 1.0);
        let ineffective = cooldown_duration(base, RulePriority::Medium, 0.0);
        assert!(effective < ineffective);
        assert_eq!(effective, base);
        assert_eq!(ineffective, base * 2);
    }

    #[tokio::test]
    async fn rule_triggers_and_mutates_config() {
        let external = InMemoryController::default();
        let mut controller = controller_with(Arc::new(external.clone()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;

        assert_eq!(triggered, vec!["rule-1".to_string()]);
        assert!(controller.is_active("rule-1"));
        let config = external.get_config().await.unwrap();
        assert_eq!(config.sampling_ratio, 0.5);

        let rule = controller.get_rule("rule-1").unwrap();
        assert_eq!(rule.metadata.trigger_count, 1);
        assert_eq!(rule.metadata.last_triggered, Some(1000));

        let history = controller.action_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, ActionOutcome::Triggered);
        assert_eq!(history[0].snapshot.violated, vec!["api".to_string()]);
    }

    #[tokio::test]
    async fn no_trigger_without_enough_violations() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("rule-1", RulePriority::High);
        rule.trigger.min_violations = 2;
        controller.add_rule(rule).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;
        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn no_trigger_when_budget_above_threshold() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("rule-1", RulePriority::High);
        // Watch both objectives: mean budget = (0.0 + 0.9) / 2 = 0.45.
        rule.trigger.objectives = vec!["api".to_string(), "publish".to_string()];
        rule.trigger.budget_threshold = 0.2;
        controller.add_rule(rule).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;
        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn cooldown_blocks_retrigger() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        let outcome = degraded_outcome();
        assert_eq!(controller.evaluate(&outcome, 1000).await.len(), 1);

        // Same snapshot again, inside cooldown: no trigger-count change.
        assert!(controller.evaluate(&outcome, 1001).await.is_empty());
        assert_eq!(controller.get_rule("rule-1").unwrap().metadata.trigger_count, 1);

        // After the cooldown has elapsed it may fire again.
        assert_eq!(controller.evaluate(&outcome, 1000 + 3600).await.len(), 1);
        assert_eq!(controller.get_rule("rule-1").unwrap().metadata.trigger_count, 2);
    }

    #[tokio::test]
    async fn disabled_rule_never_triggers() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();
        controller.set_rule_enabled("rule-1", false).unwrap();

        assert!(controller.evaluate(&degraded_outcome(), 1000).await.is_empty());
    }

    #[tokio::test]
    async fn wildcard_rule_triggers_on_any_violation() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("wildcard", RulePriority::Medium);
        rule.trigger.objectives = vec!["*".to_string()];
        // Mean budget across all objectives: 0.45.
        rule.trigger.budget_threshold = 0.5;
        controller.add_rule(rule).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;
        assert_eq!(triggered, vec!["wildcard".to_string()]);
    }

    #[tokio::test]
    async fn critical_rule_evaluated_before_high() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut emergency = test_rule("z-emergency", RulePriority::Critical);
        emergency.action = CouplingAction::EmergencyMode {
            config: BackpressureConfig {
                sampling_ratio: 0.1,
                degradation: DegradationLevel::Emergency,
                ..Default::default()
            },
        };
        controller.add_rule(emergency).unwrap();
        controller.add_rule(test_rule("a-shed", RulePriority::High)).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;

        // Despite "a-shed" sorting first lexically, the critical rule runs
        // (and its action applies) first.
        assert_eq!(
            triggered,
            vec!["z-emergency".to_string(), "a-shed".to_string()]
        );
        let history = controller.action_history(10);
        assert_eq!(history[1].rule_id, "z-emergency");
        assert_eq!(history[0].rule_id, "a-shed");
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_rule_retryable() {
        let mut controller = controller_with(Arc::new(FailingHandle));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        let triggered = controller.evaluate(&degraded_outcome(), 1000).await;

        assert!(triggered.is_empty());
        assert!(!controller.is_active("rule-1"));
        let rule = controller.get_rule("rule-1").unwrap();
        assert_eq!(rule.metadata.trigger_count, 0);
        assert_eq!(rule.metadata.last_triggered, None);

        let history = controller.action_history(10);
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].outcome, ActionOutcome::TriggerFailed { .. }));

        // Next tick it is still eligible (no cooldown was started).
        let triggered = controller.evaluate(&degraded_outcome(), 1060).await;
        assert!(triggered.is_empty()); // Still failing, but it did retry.
        assert_eq!(controller.action_history(10).len(), 2);
    }

    #[tokio::test]
    async fn revert_requires_all_three_conditions() {
        let external = InMemoryController::default();
        let mut controller = controller_with(Arc::new(external.clone()));
        let mut rule = test_rule("rule-1", RulePriority::High);
        rule.revert.requires_approval = true;
        rule.revert.min_delay_secs = 60;
        controller.add_rule(rule).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;
        assert!(controller.is_active("rule-1"));

        // Time elapsed + approval, but budget not recovered: no revert.
        controller.approve_revert("rule-1").unwrap();
        assert!(controller.check_reverts(&degraded_outcome(), 2000).await.is_empty());

        // Budget recovered + approval, but not enough time: no revert.
        assert!(controller.check_reverts(&recovered_outcome(1030), 1030).await.is_empty());

        // Time + budget recovered, all three hold now.
        let reverted = controller.check_reverts(&recovered_outcome(2000), 2000).await;
        assert_eq!(reverted, vec!["rule-1".to_string()]);
        assert!(!controller.is_active("rule-1"));
    }

    #[tokio::test]
    async fn revert_without_approval_is_blocked() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("rule-1", RulePriority::High);
        rule.revert.requires_approval = true;
        controller.add_rule(rule).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;

        // Time and budget both fine; approval missing.
        assert!(controller.check_reverts(&recovered_outcome(2000), 2000).await.is_empty());
        assert!(controller.is_active("rule-1"));
    }

    #[tokio::test]
    async fn revert_restores_prior_config() {
        let external = InMemoryController::default();
        let mut controller = controller_with(Arc::new(external.clone()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        let before = external.get_config().await.unwrap();
        controller.evaluate(&degraded_outcome(), 1000).await;
        assert_eq!(external.get_config().await.unwrap().sampling_ratio, 0.5);

        controller.check_reverts(&recovered_outcome(2000), 2000).await;
        assert_eq!(external.get_config().await.unwrap(), before);
    }

    #[tokio::test]
    async fn breaker_rule_reverts_by_closing_breakers() {
        let external = InMemoryController::default();
        let mut controller = controller_with(Arc::new(external.clone()));
        let mut rule = test_rule("breakers", RulePriority::Critical);
        rule.action = CouplingAction::EnableCircuitBreakers {
            subjects: vec!["stripe".to_string(), "webhooks".to_string()],
        };
        controller.add_rule(rule).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;
        assert_eq!(external.open_breakers(), vec!["stripe", "webhooks"]);

        controller.check_reverts(&recovered_outcome(2000), 2000).await;
        assert!(external.open_breakers().is_empty());
    }

    #[tokio::test]
    async fn no_auto_revert_flag_means_no_revert() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("manual", RulePriority::High);
        rule.auto_revert = false;
        controller.add_rule(rule).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;
        assert!(controller.check_reverts(&recovered_outcome(9000), 9000).await.is_empty());
        assert!(controller.is_active("manual"));
    }

    #[tokio::test]
    async fn retrigger_decays_effectiveness_and_revert_restores_it() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;
        let initial = controller.get_rule("rule-1").unwrap().metadata.effectiveness;

        // Still degraded after cooldown: the action did not hold.
        controller.evaluate(&degraded_outcome(), 1000 + 3600).await;
        let decayed = controller.get_rule("rule-1").unwrap().metadata.effectiveness;
        assert!(decayed < initial);

        // Budget recovers and the rule reverts: effectiveness climbs back.
        controller.check_reverts(&recovered_outcome(9000), 9000).await;
        let restored = controller.get_rule("rule-1").unwrap().metadata.effectiveness;
        assert!(restored > decayed);
    }

    #[tokio::test]
    async fn coupling_metrics_reflect_rule_set() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();
        controller.add_rule(test_rule("rule-2", RulePriority::Low)).unwrap();
        controller.set_rule_enabled("rule-2", false).unwrap();

        controller.evaluate(&degraded_outcome(), 1000).await;

        let metrics = controller.coupling_metrics();
        assert_eq!(metrics.enabled_rules, 1);
        assert_eq!(metrics.active_rules, 1);
        assert!((metrics.avg_effectiveness - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duplicate_rule_id_rejected() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();

        let err = controller.add_rule(test_rule("rule-1", RulePriority::Low));
        assert!(matches!(
            err,
            Err(CouplingError::Validation(ValidationError::DuplicateRule(_)))
        ));
    }

    #[tokio::test]
    async fn malformed_rule_rejected_at_registration() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        let mut rule = test_rule("bad", RulePriority::High);
        rule.trigger.min_violations = 0;
        assert!(controller.add_rule(rule).is_err());
        assert!(controller.list_rules().is_empty());
    }

    #[tokio::test]
    async fn remove_rule_clears_state() {
        let mut controller = controller_with(Arc::new(InMemoryController::default()));
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();
        controller.evaluate(&degraded_outcome(), 1000).await;
        assert!(controller.is_active("rule-1"));

        controller.remove_rule("rule-1").unwrap();
        assert!(!controller.is_active("rule-1"));
        assert!(controller.list_rules().is_empty());
        assert!(matches!(
            controller.remove_rule("rule-1"),
            Err(CouplingError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn events_are_emitted_on_trigger_and_revert() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut controller = CouplingController::new(
            Arc::new(InMemoryController::default()),
            bus,
            Duration::from_secs(300),
            1000,
        );
        controller.add_rule(test_rule("rule-1", RulePriority::High)).unwrap();
        controller.evaluate(&degraded_outcome(), 1000).await;
        controller.check_reverts(&recovered_outcome(2000), 2000).await;

        assert!(matches!(rx.try_recv().unwrap(), GovernorEvent::RuleAdded { .. }));
        assert!(matches!(rx.try_recv().unwrap(), GovernorEvent::RuleTriggered { .. }));
        assert!(matches!(rx.try_recv().unwrap(), GovernorEvent::RuleReverted { .. }));
    }
}
