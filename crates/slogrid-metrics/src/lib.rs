//! slogrid-metrics — the governor's observability surface.
//!
//! Renders the current evaluation outcome into Prometheus text exposition
//! format, generates an alerting-rule document from the SLO registry, and
//! assembles health reports for external health endpoints.

pub mod alerts;
pub mod prometheus;
pub mod report;

pub use alerts::render_alert_rules;
pub use prometheus::render_prometheus;
pub use report::{health_report, HealthReport, ObjectiveReport, ObjectiveStatus};
