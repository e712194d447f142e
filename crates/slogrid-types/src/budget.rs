//! Canonical error-budget arithmetic.
//!
//! The evaluator and the coupling controller both derive remaining budget
//! through this one function so the two sides can never disagree about
//! how much margin is left.

/// Remaining error budget for a target and a measured compliance, both in
/// percent.
///
/// Returns 0 whenever compliance is below target (never negative), and
/// otherwise `(compliance − target) / (100 − target)` clamped to [0, 1].
/// A target of 100 leaves no margin to normalize against; a compliant
/// measurement then reports a full budget.
pub fn error_budget(target_pct: f64, compliance_pct: f64) -> f64 {
    if compliance_pct < target_pct {
        return 0.0;
    }
    let margin = 100.0 - target_pct;
    if margin <= 0.0 {
        return 1.0;
    }
    ((compliance_pct - target_pct) / margin).clamp(0.0, 1.0)
}
