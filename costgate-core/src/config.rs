use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level costgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostgateConfig {
    pub complexity: ComplexityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Settings for the `query-complexity` plugin.
///
/// Serializes to exactly the JSON object the plugin factory accepts.
/// Both fields are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityConfig {
    #[serde(alias = "maximumComplexity")]
    pub maximum_complexity: f64,
    pub estimators: Vec<EstimatorConfig>,
}

/// Declarative estimator description. Order in a list is evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorConfig {
    /// Fixed cost per field plus the cost of its children.
    Simple {
        #[serde(default = "default_simple_cost", alias = "defaultComplexity")]
        default_complexity: f64,
    },
    /// Cost read from a directive on the schema field definition.
    Directive {
        #[serde(default = "default_directive_name")]
        name: String,
    },
    /// Explicit table: type name → field name → cost.
    FieldCosts {
        costs: HashMap<String, HashMap<String, FieldCostConfig>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldCostConfig {
    Value(f64),
    Detailed {
        value: f64,
        #[serde(default)]
        multipliers: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, the host records nothing.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_namespace")]
    pub namespace: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_simple_cost() -> f64 { 1.0 }
fn default_directive_name() -> String { "complexity".into() }
fn default_metrics_namespace() -> String { "costgate".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_metrics_namespace(),
        }
    }
}

impl CostgateConfig {
    /// Load configuration from YAML file + env overrides. The file must exist.
    ///
    /// Env keys use `COSTGATE_` and `__` between levels, e.g.
    /// `COSTGATE_COMPLEXITY__MAXIMUM_COMPLEXITY=500`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: CostgateConfig = Figment::new()
            .merge(Yaml::file_exact(path))
            .merge(Env::prefixed("COSTGATE_").split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

impl ComplexityConfig {
    /// The JSON object handed to the plugin factory.
    pub fn to_plugin_config(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
