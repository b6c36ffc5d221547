use costgate_core::config::EstimatorConfig;
use costgate_core::{CostgateError, GraphQLError};
use costgate_estimate::estimator::build_estimators;
use costgate_estimate::{
    ComplexityEngine, DefaultEngine, EstimateError, Estimator, ScoringRequest, ScoringTarget,
};
use costgate_plugin::plugin::{
    Phase, Plugin, PluginInstance, PluginResult, RequestContext, ResolvedOperation, vars,
};
use serde_json::{Map, Value};
use std::sync::Arc;

const NAME: &str = "query-complexity";
const PRIORITY: i32 = 1000;

/// Raised when a query's score exceeds the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error(
    "Query is too complex. Requested complexity {} is greater than maximum allowed {}.",
    js_number(.score),
    js_number(.maximum)
)]
pub struct QueryComplexityError {
    pub score: f64,
    pub maximum: f64,
}

impl QueryComplexityError {
    pub const CODE: &'static str = "QUERY_TOO_COMPLEX";

    pub fn new(score: f64, maximum: f64) -> Self {
        Self { score, maximum }
    }
}

impl From<QueryComplexityError> for GraphQLError {
    fn from(err: QueryComplexityError) -> Self {
        GraphQLError::new(err.to_string())
            .with_code(QueryComplexityError::CODE)
            .with_extension("complexity", json_number(err.score))
            .with_extension("maximumComplexity", json_number(err.maximum))
            .with_source(err)
    }
}

/// Number text as JavaScript's `Number.prototype.toString` renders it:
/// exponent form from 1e21 up and below 1e-6.
fn js_number(n: &f64) -> String {
    let n = *n;
    if n == 0.0 {
        return "0".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    n.to_string()
}

/// Gate configuration.
#[derive(Clone)]
pub struct QueryComplexityOptions {
    /// Tried in order for every field; the first answer wins.
    pub estimators: Vec<Estimator>,
    pub maximum_complexity: f64,
}

/// Build a gate using the default scoring engine.
pub fn query_complexity(options: QueryComplexityOptions) -> Result<QueryComplexityGate, CostgateError> {
    QueryComplexityGate::with_engine(options, Arc::new(DefaultEngine))
}

/// Rejects operations whose estimated complexity exceeds a maximum.
///
/// Runs at `did_resolve_operation`, so over-limit requests never reach a
/// resolver.
pub struct QueryComplexityGate {
    estimators: Vec<Estimator>,
    maximum_complexity: f64,
    engine: Arc<dyn ComplexityEngine>,
}

impl QueryComplexityGate {
    pub fn with_engine(
        options: QueryComplexityOptions,
        engine: Arc<dyn ComplexityEngine>,
    ) -> Result<Self, CostgateError> {
        if options.estimators.is_empty() {
            return Err(CostgateError::Config("options.estimators must not be empty.".into()));
        }
        if !is_positive(options.maximum_complexity) {
            return Err(CostgateError::Config(
                "options.maximumComplexity must be a positive number.".into(),
            ));
        }
        Ok(Self {
            estimators: options.estimators,
            maximum_complexity: options.maximum_complexity,
            engine,
        })
    }

    pub fn maximum_complexity(&self) -> f64 {
        self.maximum_complexity
    }

    pub fn estimators(&self) -> &[Estimator] {
        &self.estimators
    }

    /// Score the request. With an operation name only that operation is
    /// scored; without one, every operation in the document.
    pub fn score(
        &self,
        operation: &ResolvedOperation<'_>,
        variables: &Map<String, Value>,
    ) -> Result<f64, EstimateError> {
        let target = ScoringTarget::select(operation.document, operation.operation_name);
        self.engine.score(&ScoringRequest {
            schema: operation.schema,
            target: &target,
            estimators: &self.estimators,
            variables,
        })
    }

    /// Compare a score against the maximum. Equal is allowed.
    pub fn enforce(&self, score: f64) -> Result<(), QueryComplexityError> {
        if score > self.maximum_complexity {
            return Err(QueryComplexityError::new(score, self.maximum_complexity));
        }
        Ok(())
    }
}

impl PluginInstance for QueryComplexityGate {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::DidResolveOperation]
    }

    fn did_resolve_operation(
        &self,
        ctx: &mut RequestContext,
        operation: &ResolvedOperation<'_>,
    ) -> PluginResult {
        let score = match self.score(operation, &ctx.variables) {
            Ok(score) => score,
            Err(err) => {
                tracing::warn!(request_id = %ctx.request_id, error = %err, "Complexity estimation failed");
                return PluginResult::Abort(GraphQLError::internal(err));
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            operation = operation.operation_name.unwrap_or(""),
            complexity = score,
            maximum = self.maximum_complexity,
            "Computed query complexity"
        );
        ctx.set_var(vars::COMPLEXITY.to_string(), json_number(score));

        match self.enforce(score) {
            Ok(()) => PluginResult::Continue,
            Err(err) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    complexity = err.score,
                    maximum = err.maximum,
                    "Rejected query over complexity limit"
                );
                PluginResult::Abort(err.into())
            }
        }
    }
}

// ── Registry factory ──────────────────────────────────────────

/// Declarative factory for the gate.
///
/// Accepts `{"estimators": [...], "maximum_complexity": n}`; estimator entries
/// use the `kind`-tagged form of [`EstimatorConfig`].
pub struct QueryComplexityPlugin;

impl Plugin for QueryComplexityPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::DidResolveOperation]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let options = options_from_json(config)?;
        Ok(Box::new(query_complexity(options)?))
    }
}

fn options_from_json(config: &Value) -> Result<QueryComplexityOptions, CostgateError> {
    let Some(object) = config.as_object() else {
        return Err(CostgateError::Config("options is required".into()));
    };

    let Some(entries) = object.get("estimators").and_then(Value::as_array) else {
        return Err(CostgateError::Config("options.estimators must be an array.".into()));
    };
    let configs = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            serde_json::from_value::<EstimatorConfig>(entry.clone())
                .map_err(|e| CostgateError::Config(format!("options.estimators[{i}] is invalid: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let maximum_complexity = object
        .get("maximum_complexity")
        .or_else(|| object.get("maximumComplexity"))
        .and_then(Value::as_f64)
        .filter(|m| is_positive(*m))
        .ok_or_else(|| CostgateError::Config("options.maximumComplexity must be a positive number.".into()))?;

    Ok(QueryComplexityOptions {
        estimators: build_estimators(&configs),
        maximum_complexity,
    })
}

fn is_positive(n: f64) -> bool {
    n > 0.0
}

/// Integral scores serialize without a fractional part.
fn json_number(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgate_estimate::simple_estimator;
    use serde_json::json;

    fn options(maximum_complexity: f64) -> QueryComplexityOptions {
        QueryComplexityOptions {
            estimators: vec![simple_estimator(1.0)],
            maximum_complexity,
        }
    }

    fn config_error(config: Value) -> String {
        match QueryComplexityPlugin.configure(&config) {
            Ok(_) => panic!("expected configuration error for {config}"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn error_message_and_extensions() {
        let err: GraphQLError = QueryComplexityError::new(2.0, 1.0).into();
        assert_eq!(
            err.message,
            "Query is too complex. Requested complexity 2 is greater than maximum allowed 1."
        );
        assert_eq!(err.code(), Some("QUERY_TOO_COMPLEX"));
        assert_eq!(err.extensions["complexity"], json!(2));
        assert_eq!(err.extensions["maximumComplexity"], json!(1));
        assert_eq!(
            err.downcast_ref::<QueryComplexityError>(),
            Some(&QueryComplexityError::new(2.0, 1.0))
        );
    }

    #[test]
    fn fractional_scores_keep_their_fraction() {
        let err: GraphQLError = QueryComplexityError::new(2.5, 1.5).into();
        assert!(err.message.contains("complexity 2.5 is greater than maximum allowed 1.5"));
        assert_eq!(err.extensions["complexity"], json!(2.5));
    }

    #[test]
    fn huge_and_tiny_scores_use_exponent_notation() {
        let err = QueryComplexityError::new(1e21, 1000.0);
        assert_eq!(
            err.to_string(),
            "Query is too complex. Requested complexity 1e+21 is greater than maximum allowed 1000."
        );
        assert_eq!(js_number(&1.5e300), "1.5e+300");
        assert_eq!(js_number(&1e20), "100000000000000000000");
        assert_eq!(js_number(&1e-7), "1e-7");
        assert_eq!(js_number(&-0.0), "0");
        assert_eq!(js_number(&f64::INFINITY), "Infinity");
    }

    #[test]
    fn enforce_is_strictly_greater_than() {
        let gate = query_complexity(options(3.0)).unwrap();
        assert!(gate.enforce(2.0).is_ok());
        assert!(gate.enforce(3.0).is_ok());
        assert_eq!(gate.enforce(3.5), Err(QueryComplexityError::new(3.5, 3.0)));
    }

    #[test]
    fn typed_options_are_validated() {
        let empty = QueryComplexityOptions { estimators: vec![], maximum_complexity: 1.0 };
        assert_eq!(
            query_complexity(empty).err().unwrap().to_string(),
            "options.estimators must not be empty."
        );
        for bad in [0.0, -1.0, f64::NAN] {
            let err = query_complexity(options(bad)).err().unwrap();
            assert!(err.is_config());
            assert_eq!(err.to_string(), "options.maximumComplexity must be a positive number.");
        }
    }

    #[test]
    fn gate_declares_only_did_resolve_operation() {
        let gate = query_complexity(options(1.0)).unwrap();
        assert_eq!(PluginInstance::name(&gate), "query-complexity");
        assert_eq!(PluginInstance::phases(&gate), &[Phase::DidResolveOperation]);
        assert_eq!(gate.estimators().len(), 1);
        assert_eq!(gate.maximum_complexity(), 1.0);
    }

    // ── Factory validation ────────────────────────────────────────

    #[test]
    fn factory_rejects_missing_options() {
        assert_eq!(config_error(Value::Null), "options is required");
        assert_eq!(config_error(json!("1")), "options is required");
    }

    #[test]
    fn factory_rejects_non_array_estimators() {
        assert_eq!(config_error(json!({})), "options.estimators must be an array.");
        assert_eq!(
            config_error(json!({"estimators": {}, "maximum_complexity": 1})),
            "options.estimators must be an array."
        );
    }

    #[test]
    fn factory_rejects_bad_maximum() {
        let simple = json!([{"kind": "simple"}]);
        for max in [json!(null), json!("1"), json!(0), json!(-3)] {
            assert_eq!(
                config_error(json!({"estimators": simple.clone(), "maximumComplexity": max})),
                "options.maximumComplexity must be a positive number."
            );
        }
        assert_eq!(
            config_error(json!({"estimators": simple})),
            "options.maximumComplexity must be a positive number."
        );
    }

    #[test]
    fn factory_rejects_empty_estimators() {
        assert_eq!(
            config_error(json!({"estimators": [], "maximum_complexity": 1})),
            "options.estimators must not be empty."
        );
    }

    #[test]
    fn factory_rejects_unknown_estimator_kind() {
        let msg = config_error(json!({"estimators": [{"kind": "magic"}], "maximum_complexity": 1}));
        assert!(msg.starts_with("options.estimators[0] is invalid"));
    }

    #[test]
    fn factory_accepts_both_key_styles() {
        for key in ["maximum_complexity", "maximumComplexity"] {
            let mut config = json!({"estimators": [{"kind": "directive"}, {"kind": "simple"}]});
            config[key] = json!(10);
            let inst = QueryComplexityPlugin.configure(&config).unwrap();
            assert_eq!(inst.name(), "query-complexity");
            assert_eq!(inst.priority(), 1000);
        }
    }

    #[test]
    fn json_numbers_drop_integral_fraction() {
        assert_eq!(json_number(3.0), json!(3));
        assert_eq!(json_number(0.25), json!(0.25));
    }
}
