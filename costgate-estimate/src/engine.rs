//! The seam between the gate and the scoring algorithm.

use crate::complexity::{ScoringTarget, score_target};
use crate::error::EstimateError;
use crate::estimator::Estimator;
use costgate_core::schema::Schema;
use serde_json::{Map, Value};

/// Inputs for one scoring run.
pub struct ScoringRequest<'a> {
    pub schema: &'a Schema,
    pub target: &'a ScoringTarget<'a>,
    pub estimators: &'a [Estimator],
    pub variables: &'a Map<String, Value>,
}

/// Computes a complexity score for a request.
///
/// The gate only depends on this trait, so tests can substitute a fixed or
/// failing engine.
pub trait ComplexityEngine: Send + Sync {
    fn score(&self, request: &ScoringRequest<'_>) -> Result<f64, EstimateError>;
}

/// Walks the selected operations with the configured estimators.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEngine;

impl ComplexityEngine for DefaultEngine {
    fn score(&self, request: &ScoringRequest<'_>) -> Result<f64, EstimateError> {
        score_target(request.schema, request.target, request.estimators, request.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::simple_estimator;
    use costgate_core::document::parse_query;

    #[test]
    fn default_engine_scores_target() {
        let schema = Schema::parse("type Query { a: String b: String }").unwrap();
        let document = parse_query("{ a b }").unwrap();
        let target = ScoringTarget::select(&document, None);
        let estimators = vec![simple_estimator(2.0)];
        let variables = Map::new();
        let request = ScoringRequest {
            schema: &schema,
            target: &target,
            estimators: &estimators,
            variables: &variables,
        };
        assert_eq!(DefaultEngine.score(&request), Ok(4.0));
    }
}
