//! Generated alerting rules.
//!
//! Derives a textual alerting-rule document from the SLO registry — one
//! alert definition per objective plus global health alerts — suitable
//! for feeding a metrics-alerting backend.

use slogrid_slo::SloRegistry;
use slogrid_types::SloSeverity;

/// Health score below which the global degraded alert fires.
const HEALTH_DEGRADED_BELOW: f64 = 90.0;
/// Health score below which the global critical alert fires.
const HEALTH_CRITICAL_BELOW: f64 = 70.0;

/// Render one alert per registered objective plus the global
/// health-degraded/health-critical alerts.
pub fn render_alert_rules(registry: &SloRegistry) -> String {
    let mut out = String::new();
    out.push_str("groups:\n");
    out.push_str("  - name: slogrid_slo\n");
    out.push_str("    rules:\n");

    for slo in registry.iter() {
        out.push_str(&format!("      - alert: SloViolated_{}\n", sanitize(&slo.name)));
        out.push_str(&format!(
            "        expr: slogrid_slo_compliance_pct{{objective=\"{}\"}} < {}\n",
            slo.name, slo.target_pct
        ));
        out.push_str(&format!("        for: {}s\n", slo.window_secs));
        out.push_str("        labels:\n");
        out.push_str(&format!("          severity: {}\n", severity_label(slo.severity)));
        out.push_str("        annotations:\n");
        out.push_str(&format!(
            "          summary: \"{} below target {}%\"\n",
            slo.name, slo.target_pct
        ));
        out.push_str(&format!("          description: \"{}\"\n", slo.description));
    }

    out.push_str("  - name: slogrid_health\n");
    out.push_str("    rules:\n");
    out.push_str("      - alert: SystemHealthDegraded\n");
    out.push_str(&format!(
        "        expr: slogrid_health_score < {HEALTH_DEGRADED_BELOW}\n"
    ));
    out.push_str("        labels:\n");
    out.push_str("          severity: warning\n");
    out.push_str("      - alert: SystemHealthCritical\n");
    out.push_str(&format!(
        "        expr: slogrid_health_score < {HEALTH_CRITICAL_BELOW}\n"
    ));
    out.push_str("        labels:\n");
    out.push_str("          severity: critical\n");

    out
}

fn severity_label(severity: SloSeverity) -> &'static str {
    match severity {
        SloSeverity::Info => "info",
        SloSeverity::Warning => "warning",
        SloSeverity::Critical => "critical",
    }
}

/// Alert names allow only alphanumerics and underscores.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
