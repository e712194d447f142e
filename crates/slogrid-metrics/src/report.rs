//! Health reports for external consumption.
//!
//! Assembles the overall score, per-objective status, and textual
//! recommendations from the latest evaluation outcome. Meant to back an
//! external HTTP health endpoint, which is out of scope here.

use serde::{Deserialize, Serialize};

use slogrid_slo::SloRegistry;
use slogrid_types::{CouplingMetrics, EvaluationOutcome};

/// Budget below which a compliant objective is still flagged at-risk.
const AT_RISK_BUDGET: f64 = 0.25;

/// Per-objective line in a health report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveReport {
    pub name: String,
    pub status: ObjectiveStatus,
    pub target_pct: f64,
    pub compliance_pct: f64,
    pub error_budget: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Healthy,
    AtRisk,
    Violated,
}

/// Snapshot health report for the whole governor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub overall_score: f64,
    pub objectives: Vec<ObjectiveReport>,
    pub recommendations: Vec<String>,
}

/// Build a report from the registry and the latest outcome.
pub fn health_report(
    registry: &SloRegistry,
    outcome: &EvaluationOutcome,
    coupling: &CouplingMetrics,
) -> HealthReport {
    let mut objectives = Vec::with_capacity(registry.len());
    let mut recommendations = Vec::new();

    for slo in registry.iter() {
        let Some(sample) = outcome.sample(&slo.name) else {
            continue;
        };
        let status = if outcome.is_violated(&slo.name) {
            ObjectiveStatus::Violated
        } else if sample.error_budget < AT_RISK_BUDGET {
            ObjectiveStatus::AtRisk
        } else {
            ObjectiveStatus::Healthy
        };

        match status {
            ObjectiveStatus::Violated => recommendations.push(format!(
                "{} is violating its target ({:.2}% < {:.2}%); review recent coupling actions",
                slo.name, sample.compliance_pct, slo.target_pct
            )),
            ObjectiveStatus::AtRisk => recommendations.push(format!(
                "{} has {:.0}% of its error budget left; consider tightening admission control",
                slo.name,
                sample.error_budget * 100.0
            )),
            ObjectiveStatus::Healthy => {}
        }

        objectives.push(ObjectiveReport {
            name: slo.name.clone(),
            status,
            target_pct: slo.target_pct,
            compliance_pct: sample.compliance_pct,
            error_budget: sample.error_budget,
        });
    }

    if coupling.active_rules > 0 {
        recommendations.push(format!(
            "{} coupling rule(s) currently hold backpressure actions applied",
            coupling.active_rules
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("all objectives within budget".to_string());
    }

    HealthReport {
        overall_score: outcome.health_score,
        objectives,
        recommendations,
    }
}
