//! slogrid.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use slogrid_governor::GovernorSettings;
use slogrid_slo::SloRegistry;
use slogrid_types::{
    BackpressureOverrides, CouplingAction, CouplingRule, RevertCondition, RuleMetadata,
    RulePriority, ServiceLevelObjective, SloSeverity, TriggerCondition,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlogridConfig {
    #[serde(default)]
    pub governor: GovernorSection,
    /// Fixed compliance values fed to the in-process metric backend.
    #[serde(default)]
    pub demo: DemoSection,
    #[serde(default, rename = "objective")]
    pub objectives: Vec<ServiceLevelObjective>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<CouplingRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorSection {
    pub tick_interval_secs: u64,
    pub query_timeout_secs: u64,
    pub base_cooldown_secs: u64,
    pub history_cap: usize,
}

impl Default for GovernorSection {
    fn default() -> Self {
        let defaults = GovernorSettings::default();
        Self {
            tick_interval_secs: defaults.tick_interval.as_secs(),
            query_timeout_secs: defaults.query_timeout.as_secs(),
            base_cooldown_secs: defaults.base_cooldown.as_secs(),
            history_cap: defaults.history_cap,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoSection {
    /// Compliance percentage per objective name.
    #[serde(default)]
    pub compliance: BTreeMap<String, f64>,
}

impl SlogridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SlogridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn settings(&self) -> GovernorSettings {
        GovernorSettings {
            tick_interval: Duration::from_secs(self.governor.tick_interval_secs),
            query_timeout: Duration::from_secs(self.governor.query_timeout_secs),
            base_cooldown: Duration::from_secs(self.governor.base_cooldown_secs),
            history_cap: self.governor.history_cap,
        }
    }

    /// Build the objective registry, validating every declared objective.
    pub fn build_registry(&self) -> anyhow::Result<SloRegistry> {
        let mut builder = SloRegistry::builder();
        for objective in &self.objectives {
            builder = builder.objective(objective.clone());
        }
        Ok(builder.build()?)
    }

    /// Scaffold a worked slogrid.toml with one objective and one rule.
    pub fn scaffold() -> Self {
        SlogridConfig {
            governor: GovernorSection {
                tick_interval_secs: 30,
                ..Default::default()
            },
            demo: DemoSection {
                compliance: BTreeMap::from([("api-availability".to_string(), 92.0)]),
            },
            objectives: vec![ServiceLevelObjective {
                name: "api-availability".to_string(),
                description: "share of API requests answered successfully".to_string(),
                target_pct: 95.0,
                window_secs: 300,
                severity: SloSeverity::Critical,
                query: "compliance:api-availability".to_string(),
            }],
            rules: vec![CouplingRule {
                id: "shed-sampling".to_string(),
                name: "halve sampling when availability budget runs out".to_string(),
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
                    min_delay_secs: 300,
                    requires_approval: false,
                },
                metadata: RuleMetadata::default(),
            }],
        }
    }
}
