//! The SLO registry — immutable objective definitions.
//!
//! Built once at startup from configuration and never mutated afterwards.
//! Temporary target changes go through the adaptive threshold manager,
//! not the registry.

use std::collections::BTreeMap;

use slogrid_types::{ServiceLevelObjective, SloName, ValidationError, ValidationResult};

/// Immutable set of registered objectives, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SloRegistry {
    objectives: BTreeMap<SloName, ServiceLevelObjective>,
}

impl SloRegistry {
    pub fn builder() -> SloRegistryBuilder {
        SloRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceLevelObjective> {
        self.objectives.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objectives.contains_key(name)
    }

    /// Objectives in stable (name) order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceLevelObjective> {
        self.objectives.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &SloName> {
        self.objectives.keys()
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }
}

/// Builder that validates objectives before the registry is sealed.
#[derive(Debug, Default)]
pub struct SloRegistryBuilder {
    objectives: Vec<ServiceLevelObjective>,
}

impl SloRegistryBuilder {
    pub fn objective(mut self, slo: ServiceLevelObjective) -> Self {
        self.objectives.push(slo);
        self
    }

    /// Seal the registry, rejecting duplicate names and out-of-range targets.
    pub fn build(self) -> ValidationResult<SloRegistry> {
        let mut objectives = BTreeMap::new();
        for slo in self.objectives {
            if !(0.0..=100.0).contains(&slo.target_pct) {
                return Err(ValidationError::TargetOutOfRange(slo.target_pct));
            }
            if objectives.contains_key(&slo.name) {
                return Err(ValidationError::DuplicateObjective(slo.name));
            }
            objectives.insert(slo.name.clone(), slo);
        }
        Ok(SloRegistry { objectives })
    }
}
