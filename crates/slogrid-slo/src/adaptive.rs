//! Adaptive threshold manager — time-bounded target overrides.
//!
//! A rule's action or an operator can temporarily relax or tighten an
//! objective's effective target. Overrides expire lazily: lookups filter
//! out past-expiry entries, storage is never actively swept.

use std::collections::HashMap;

use tracing::info;

use slogrid_types::{
    AdaptiveThreshold, ServiceLevelObjective, SloName, ValidationError, ValidationResult,
};

/// Owns the active target overrides, keyed by objective name.
///
/// One override per objective; creating a new one replaces the old.
#[derive(Debug, Default)]
pub struct AdaptiveThresholdManager {
    thresholds: HashMap<SloName, AdaptiveThreshold>,
}

impl AdaptiveThresholdManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an override for an objective.
    ///
    /// `adaptive_target = original_target * adjustment_factor`. Confidence
    /// is higher the closer the factor is to 1 — small adjustments are
    /// trusted more.
    pub fn create_override(
        &mut self,
        slo: &ServiceLevelObjective,
        adjustment_factor: f64,
        reason: &str,
        validity_secs: u64,
        now: u64,
    ) -> ValidationResult<AdaptiveThreshold> {
        if adjustment_factor <= 0.0 {
            return Err(ValidationError::AdjustmentFactorOutOfRange(adjustment_factor));
        }

        let threshold = AdaptiveThreshold {
            objective: slo.name.clone(),
            original_target: slo.target_pct,
            adaptive_target: slo.target_pct * adjustment_factor,
            adjustment_factor,
            reason: reason.to_string(),
            expires_at: now + validity_secs,
            confidence: (1.0 - (1.0 - adjustment_factor).abs()).clamp(0.0, 1.0),
        };

        info!(
            objective = %slo.name,
            original = slo.target_pct,
            adaptive = threshold.adaptive_target,
            factor = adjustment_factor,
            validity_secs,
            reason,
            "adaptive threshold created"
        );

        self.thresholds
            .insert(slo.name.clone(), threshold.clone());
        Ok(threshold)
    }

    /// All overrides still in effect at `now`.
    pub fn active_overrides(&self, now: u64) -> Vec<AdaptiveThreshold> {
        self.thresholds
            .values()
            .filter(|t| t.is_active(now))
            .cloned()
            .collect()
    }

    /// The effective target for an objective: the adaptive target when a
    /// non-expired override exists, else the declared target.
    pub fn effective_target(&self, slo: &ServiceLevelObjective, now: u64) -> f64 {
        match self.thresholds.get(&slo.name) {
            Some(t) if t.is_active(now) => t.adaptive_target,
            _ => slo.target_pct,
        }
    }

    /// Total entries in storage, expired ones included.
    pub fn stored_len(&self) -> usize {
        self.thresholds.len()
    }
}
