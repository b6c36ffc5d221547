use costgate_core::document::{find_operation, parse_query};
use costgate_core::{GraphQLError, Schema};
use costgate_estimate::{
    ComplexityEngine, EstimateError, ScoringRequest, directive_estimator, simple_estimator,
};
use costgate_plugin::plugin::{
    PluginInstance, PluginResult, RequestContext, ResolvedOperation, vars,
};
use costgate_plugin::registry::PluginRegistry;
use costgate_plugins::{
    QueryComplexityError, QueryComplexityGate, QueryComplexityOptions, query_complexity,
    register_all,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const TYPE_DEFS: &str = r#"
    directive @complexity(
      value: Int!
      multipliers: [String!]
    ) on FIELD_DEFINITION

    type Query {
      a: String!
      b: String!
      c(n: Int!): String! @complexity(value: 1, multipliers: ["n"])
    }
"#;

fn gate(maximum_complexity: f64) -> QueryComplexityGate {
    query_complexity(QueryComplexityOptions {
        estimators: vec![directive_estimator("complexity"), simple_estimator(1.0)],
        maximum_complexity,
    })
    .unwrap()
}

/// Drive the hook the way a host would after resolving the operation.
fn run(
    gate: &dyn PluginInstance,
    query: &str,
    operation_name: Option<&str>,
    variables: Value,
) -> (PluginResult, RequestContext) {
    let schema = Schema::parse(TYPE_DEFS).unwrap();
    let document = parse_query(query).unwrap();
    let operation = find_operation(&document, operation_name).unwrap();
    let variables = variables.as_object().cloned().unwrap_or_default();
    let mut ctx = RequestContext::new(query.to_string(), operation_name.map(String::from), variables);
    let resolved = ResolvedOperation {
        schema: &schema,
        document: &document,
        operation_name,
        operation,
    };
    let result = gate.did_resolve_operation(&mut ctx, &resolved);
    (result, ctx)
}

fn abort_error(result: PluginResult) -> GraphQLError {
    match result {
        PluginResult::Abort(err) => err,
        PluginResult::Continue => panic!("expected the gate to abort"),
    }
}

// =============================================================================
// Threshold
// =============================================================================

#[test]
fn test_allows_normal_non_complex_queries() {
    let (result, ctx) = run(&gate(1.0), "query Q { a }", None, json!({}));
    assert!(matches!(result, PluginResult::Continue));
    assert_eq!(ctx.get_var(vars::COMPLEXITY), Some(&json!(1)));
}

#[test]
fn test_disallows_normal_complex_queries() {
    let (result, ctx) = run(&gate(1.0), "query Q { a b }", None, json!({}));
    let err = abort_error(result);
    assert_eq!(err.code(), Some("QUERY_TOO_COMPLEX"));
    assert_eq!(err.extensions["complexity"], json!(2));
    assert_eq!(err.extensions["maximumComplexity"], json!(1));
    assert_eq!(
        err.message,
        "Query is too complex. Requested complexity 2 is greater than maximum allowed 1."
    );
    // The score is recorded even for rejected requests
    assert_eq!(ctx.get_var(vars::COMPLEXITY), Some(&json!(2)));
}

#[test]
fn test_score_equal_to_maximum_passes() {
    let (result, _) = run(&gate(2.0), "query Q { a b }", None, json!({}));
    assert!(matches!(result, PluginResult::Continue));
}

#[test]
fn test_rejection_keeps_typed_error() {
    let (result, _) = run(&gate(1.0), "{ a b }", None, json!({}));
    let err = abort_error(result);
    let typed = err.downcast_ref::<QueryComplexityError>().unwrap();
    assert_eq!(typed.score, 2.0);
    assert_eq!(typed.maximum, 1.0);
}

// =============================================================================
// Variables
// =============================================================================

#[test]
fn test_allows_complex_queries_with_variables() {
    let q = "query Q($n: Int!) { c(n: $n) }";
    let (result, _) = run(&gate(1.0), q, None, json!({"n": 1}));
    assert!(matches!(result, PluginResult::Continue));
}

#[test]
fn test_disallows_complex_queries_with_variables() {
    let q = "query Q($n: Int!) { c(n: $n) }";
    let (result, _) = run(&gate(1.0), q, None, json!({"n": 100}));
    let err = abort_error(result);
    assert_eq!(err.extensions["complexity"], json!(100));
}

#[test]
fn test_missing_required_variable_aborts_as_internal_error() {
    let q = "query Q($n: Int!) { c(n: $n) }";
    let (result, _) = run(&gate(1.0), q, None, json!({}));
    let err = abort_error(result);
    assert_eq!(err.code(), Some("INTERNAL_SERVER_ERROR"));
    assert!(matches!(err.downcast_ref::<EstimateError>(), Some(EstimateError::Variable(_))));
}

// =============================================================================
// Multiple operations
// =============================================================================

const TWO_OPS: &str = "query A { a } query B { a b }";

#[test]
fn test_allows_non_complex_named_operation() {
    let (result, _) = run(&gate(1.0), TWO_OPS, Some("A"), json!({}));
    assert!(matches!(result, PluginResult::Continue));
}

#[test]
fn test_disallows_complex_named_operation() {
    let (result, _) = run(&gate(1.0), TWO_OPS, Some("B"), json!({}));
    let err = abort_error(result);
    assert_eq!(err.extensions["complexity"], json!(2));
}

// =============================================================================
// Engine injection
// =============================================================================

struct FixedEngine {
    score: f64,
    seen: Mutex<Vec<usize>>,
}

impl ComplexityEngine for FixedEngine {
    fn score(&self, request: &ScoringRequest<'_>) -> Result<f64, EstimateError> {
        self.seen.lock().unwrap().push(request.target.operations().len());
        Ok(self.score)
    }
}

struct FailingEngine;

impl ComplexityEngine for FailingEngine {
    fn score(&self, _request: &ScoringRequest<'_>) -> Result<f64, EstimateError> {
        Err(EstimateError::NoEstimate {
            type_name: "Query".into(),
            field_name: "a".into(),
        })
    }
}

fn options(maximum_complexity: f64) -> QueryComplexityOptions {
    QueryComplexityOptions {
        estimators: vec![simple_estimator(1.0)],
        maximum_complexity,
    }
}

#[test]
fn test_engine_sees_selected_target() {
    let engine = Arc::new(FixedEngine { score: 5.0, seen: Mutex::new(Vec::new()) });
    let gate = QueryComplexityGate::with_engine(options(10.0), engine.clone()).unwrap();

    let (result, _) = run(&gate, TWO_OPS, Some("B"), json!({}));
    assert!(matches!(result, PluginResult::Continue));
    let (result, _) = run(&gate, "{ a }", None, json!({}));
    assert!(matches!(result, PluginResult::Continue));

    assert_eq!(*engine.seen.lock().unwrap(), vec![1, 1]);
}

#[test]
fn test_engine_score_over_maximum_is_rejected() {
    let engine = Arc::new(FixedEngine { score: 10.5, seen: Mutex::new(Vec::new()) });
    let gate = QueryComplexityGate::with_engine(options(10.0), engine).unwrap();
    let err = abort_error(run(&gate, "{ a }", None, json!({})).0);
    assert_eq!(err.extensions["complexity"], json!(10.5));
}

#[test]
fn test_engine_errors_propagate() {
    let gate = QueryComplexityGate::with_engine(options(10.0), Arc::new(FailingEngine)).unwrap();
    let err = abort_error(run(&gate, "{ a }", None, json!({})).0);
    assert_eq!(err.code(), Some("INTERNAL_SERVER_ERROR"));
    assert!(err.message.starts_with("No complexity could be calculated for field Query.a."));
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_register_all_exposes_query_complexity() {
    let mut registry = PluginRegistry::new();
    register_all(&mut registry);
    assert!(registry.get("query-complexity").is_some());

    let config = json!({
        "estimators": [{"kind": "directive", "name": "complexity"}, {"kind": "simple"}],
        "maximumComplexity": 1
    });
    let instance = registry.configure("query-complexity", &config).unwrap();
    let (result, _) = run(instance.as_ref(), "{ a b }", None, json!({}));
    assert_eq!(abort_error(result).code(), Some("QUERY_TOO_COMPLEX"));
}

#[test]
fn test_registry_rejects_invalid_options() {
    let mut registry = PluginRegistry::new();
    register_all(&mut registry);
    for config in [
        Value::Null,
        json!({}),
        json!({"estimators": []}),
        json!({"estimators": [{"kind": "simple"}], "maximumComplexity": "1"}),
        json!({"estimators": [{"kind": "simple"}], "maximumComplexity": 0}),
    ] {
        assert!(registry.configure("query-complexity", &config).is_err(), "{config}");
    }
}
