//! Prometheus text exposition format.
//!
//! Renders the latest evaluation outcome and coupling metrics into the
//! Prometheus text exposition format for scraping.

use slogrid_types::{CouplingMetrics, EvaluationOutcome};

/// Render per-objective gauges, the violation counter, the overall
/// health-score gauge, and rule-set gauges.
pub fn render_prometheus(outcome: &EvaluationOutcome, coupling: &CouplingMetrics) -> String {
    let mut out = String::new();

    out.push_str("# HELP slogrid_slo_compliance_pct Measured compliance percentage per objective.\n");
    out.push_str("# TYPE slogrid_slo_compliance_pct gauge\n");
    for s in &outcome.samples {
        out.push_str(&format!(
            "slogrid_slo_compliance_pct{{objective=\"{}\"}} {:.2}\n",
            s.objective, s.compliance_pct
        ));
    }

    out.push_str("# HELP slogrid_slo_error_budget Remaining error budget per objective (0-1).\n");
    out.push_str("# TYPE slogrid_slo_error_budget gauge\n");
    for s in &outcome.samples {
        out.push_str(&format!(
            "slogrid_slo_error_budget{{objective=\"{}\"}} {:.4}\n",
            s.objective, s.error_budget
        ));
    }

    out.push_str("# HELP slogrid_slo_violations Objectives currently in violation.\n");
    out.push_str("# TYPE slogrid_slo_violations gauge\n");
    out.push_str(&format!("slogrid_slo_violations {}\n", outcome.violations.len()));

    out.push_str("# HELP slogrid_health_score Average compliance across all objectives.\n");
    out.push_str("# TYPE slogrid_health_score gauge\n");
    out.push_str(&format!("slogrid_health_score {:.2}\n", outcome.health_score));

    out.push_str("# HELP slogrid_rules_enabled Enabled coupling rules.\n");
    out.push_str("# TYPE slogrid_rules_enabled gauge\n");
    out.push_str(&format!("slogrid_rules_enabled {}\n", coupling.enabled_rules));

    out.push_str("# HELP slogrid_rules_active Coupling rules with an applied action.\n");
    out.push_str("# TYPE slogrid_rules_active gauge\n");
    out.push_str(&format!("slogrid_rules_active {}\n", coupling.active_rules));

    out.push_str("# HELP slogrid_rule_effectiveness Average rule effectiveness (0-1).\n");
    out.push_str("# TYPE slogrid_rule_effectiveness gauge\n");
    out.push_str(&format!(
        "slogrid_rule_effectiveness {:.4}\n",
        coupling.avg_effectiveness
    ));

    out
}
