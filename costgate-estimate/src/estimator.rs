//! Field cost estimators.
//!
//! An estimator looks at one field in context and either names its cost or
//! declines with `None`, letting the next estimator in the list answer.

use crate::error::EstimateError;
use costgate_core::config::{EstimatorConfig, FieldCostConfig};
use costgate_core::schema::{FieldDef, TypeDef};
use graphql_parser::query::Field;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything an estimator may look at for a single field.
pub struct EstimatorArgs<'a> {
    /// Type the field is selected on.
    pub parent_type: &'a TypeDef,
    pub field: &'a FieldDef,
    pub node: &'a Field<'static, String>,
    /// Coerced argument values, defaults applied.
    pub args: &'a Map<String, Value>,
    /// Cost of the field's own selection set; 0 for leaves.
    pub child_complexity: f64,
}

pub trait ComplexityEstimator: Send + Sync {
    /// `Err` aborts scoring of the field; `Ok(None)` defers to the next estimator.
    fn estimate(&self, args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError>;
}

impl<F> ComplexityEstimator for F
where
    F: Fn(&EstimatorArgs<'_>) -> Option<f64> + Send + Sync,
{
    fn estimate(&self, args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError> {
        Ok(self(args))
    }
}

/// Shared handle to an estimator, as held in estimator lists.
pub type Estimator = Arc<dyn ComplexityEstimator>;

// ── Simple ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SimpleEstimator {
    default_complexity: f64,
}

impl ComplexityEstimator for SimpleEstimator {
    fn estimate(&self, args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError> {
        Ok(Some(self.default_complexity + args.child_complexity))
    }
}

/// Every field costs `default_complexity` plus its children.
pub fn simple_estimator(default_complexity: f64) -> Estimator {
    Arc::new(SimpleEstimator { default_complexity })
}

// ── Directive ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DirectiveEstimator {
    name: String,
}

impl ComplexityEstimator for DirectiveEstimator {
    fn estimate(&self, args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError> {
        let Some(directive) = args.field.directive(&self.name) else {
            return Ok(None);
        };
        let value = directive_value(directive.argument("value"))?;
        let multipliers = directive_multipliers(directive.argument("multipliers"))?;
        Ok(Some((value + args.child_complexity) * total_multiplier(&multipliers, args.args)))
    }
}

/// `value: Int!`
fn directive_value(value: Option<&Value>) -> Result<f64, EstimateError> {
    match value {
        None => Err(EstimateError::Directive(
            "Argument \"value\" of required type \"Int!\" was not provided.".into(),
        )),
        Some(v) => match v.as_i64() {
            Some(n) if i32::try_from(n).is_ok() => Ok(n as f64),
            _ => Err(EstimateError::Directive(format!("Argument \"value\" has invalid value {v}."))),
        },
    }
}

/// `multipliers: [String!]`; a single string stands for a one-element list.
fn directive_multipliers(value: Option<&Value>) -> Result<Vec<&str>, EstimateError> {
    let invalid = |v: &Value| EstimateError::Directive(format!("Argument \"multipliers\" has invalid value {v}."));
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(path)) => Ok(vec![path.as_str()]),
        Some(list @ Value::Array(paths)) => paths
            .iter()
            .map(|p| p.as_str().ok_or_else(|| invalid(list)))
            .collect(),
        Some(other) => Err(invalid(other)),
    }
}

/// Reads `@<name>(value: Int!, multipliers: [String!])` from the schema field
/// definition. Fields without the directive are left to later estimators.
pub fn directive_estimator(name: impl Into<String>) -> Estimator {
    Arc::new(DirectiveEstimator { name: name.into() })
}

// ── Field cost table ──────────────────────────────────────────

type CostFn = dyn Fn(&EstimatorArgs<'_>) -> Option<f64> + Send + Sync;

/// Cost attached to one schema field.
#[derive(Clone)]
pub enum FieldCost {
    Fixed { value: f64, multipliers: Vec<String> },
    Custom(Arc<CostFn>),
}

impl fmt::Debug for FieldCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCost::Fixed { value, multipliers } => f
                .debug_struct("Fixed")
                .field("value", value)
                .field("multipliers", multipliers)
                .finish(),
            FieldCost::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&FieldCostConfig> for FieldCost {
    fn from(config: &FieldCostConfig) -> Self {
        match config {
            FieldCostConfig::Value(value) => FieldCost::Fixed {
                value: *value,
                multipliers: Vec::new(),
            },
            FieldCostConfig::Detailed { value, multipliers } => FieldCost::Fixed {
                value: *value,
                multipliers: multipliers.clone(),
            },
        }
    }
}

/// Costs keyed by parent type name, then field name.
#[derive(Debug, Clone, Default)]
pub struct FieldCostTable {
    entries: HashMap<String, HashMap<String, FieldCost>>,
}

impl FieldCostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(self, type_name: &str, field_name: &str, value: f64) -> Self {
        self.with_entry(type_name, field_name, FieldCost::Fixed { value, multipliers: Vec::new() })
    }

    pub fn with_multiplied_cost(
        self,
        type_name: &str,
        field_name: &str,
        value: f64,
        multipliers: &[&str],
    ) -> Self {
        let multipliers = multipliers.iter().map(|m| m.to_string()).collect();
        self.with_entry(type_name, field_name, FieldCost::Fixed { value, multipliers })
    }

    pub fn with_custom<F>(self, type_name: &str, field_name: &str, cost: F) -> Self
    where
        F: Fn(&EstimatorArgs<'_>) -> Option<f64> + Send + Sync + 'static,
    {
        self.with_entry(type_name, field_name, FieldCost::Custom(Arc::new(cost)))
    }

    fn with_entry(mut self, type_name: &str, field_name: &str, cost: FieldCost) -> Self {
        self.entries
            .entry(type_name.to_string())
            .or_default()
            .insert(field_name.to_string(), cost);
        self
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&FieldCost> {
        self.entries.get(type_name)?.get(field_name)
    }

    pub fn from_config(costs: &HashMap<String, HashMap<String, FieldCostConfig>>) -> Self {
        let entries = costs
            .iter()
            .map(|(type_name, fields)| {
                let fields = fields
                    .iter()
                    .map(|(field_name, cost)| (field_name.clone(), FieldCost::from(cost)))
                    .collect();
                (type_name.clone(), fields)
            })
            .collect();
        Self { entries }
    }
}

#[derive(Debug, Clone)]
pub struct FieldCostEstimator {
    table: FieldCostTable,
}

impl ComplexityEstimator for FieldCostEstimator {
    fn estimate(&self, args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError> {
        let cost = match self.table.get(&args.parent_type.name, &args.field.name) {
            None => None,
            Some(FieldCost::Fixed { value, multipliers }) => {
                let paths: Vec<&str> = multipliers.iter().map(String::as_str).collect();
                Some((value + args.child_complexity) * total_multiplier(&paths, args.args))
            }
            Some(FieldCost::Custom(cost)) => cost(args),
        };
        Ok(cost)
    }
}

/// Looks costs up in a table maintained next to the schema.
pub fn field_cost_estimator(table: FieldCostTable) -> Estimator {
    Arc::new(FieldCostEstimator { table })
}

// ── Config ────────────────────────────────────────────────────

pub fn from_config(config: &EstimatorConfig) -> Estimator {
    match config {
        EstimatorConfig::Simple { default_complexity } => simple_estimator(*default_complexity),
        EstimatorConfig::Directive { name } => directive_estimator(name.as_str()),
        EstimatorConfig::FieldCosts { costs } => field_cost_estimator(FieldCostTable::from_config(costs)),
    }
}

pub fn build_estimators(configs: &[EstimatorConfig]) -> Vec<Estimator> {
    configs.iter().map(from_config).collect()
}

// ── Multipliers ───────────────────────────────────────────────

/// Product of the argument values found at `paths`.
///
/// Numbers multiply, lists multiply by their length, anything else (missing
/// included) is ignored.
pub fn total_multiplier(paths: &[&str], args: &Map<String, Value>) -> f64 {
    paths.iter().fold(1.0, |acc, path| match lookup_path(args, path) {
        Some(Value::Number(n)) => n.as_f64().map_or(acc, |m| acc * m),
        Some(Value::Array(items)) => acc * items.len() as f64,
        _ => acc,
    })
}

/// Resolve a dotted path such as `filter.ids` or `pages[0].size`.
pub fn lookup_path<'v>(args: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    let mut segments = normalized.split('.').filter(|s| !s.is_empty());
    let mut current = args.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
