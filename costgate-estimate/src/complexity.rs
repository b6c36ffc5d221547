//! Static complexity scoring of executable documents.

use crate::error::EstimateError;
use crate::estimator::{Estimator, EstimatorArgs};
use costgate_core::QueryDocument;
use costgate_core::document::{
    Fragment, Operation, fragments, operation_kind, operation_name, operations, selection_set,
    should_include, variable_definitions,
};
use costgate_core::schema::{Schema, TypeDef};
use costgate_core::value::{argument_values, coerce_variable_values};
use graphql_parser::query::{Selection, SelectionSet, TypeCondition};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct ComplexityOptions<'a> {
    pub schema: &'a Schema,
    pub document: &'a QueryDocument,
    /// Score only the operation of this name. `None` scores every operation.
    pub operation_name: Option<&'a str>,
    pub estimators: &'a [Estimator],
    pub variables: &'a Map<String, Value>,
}

/// Compute the complexity of the selected operations.
pub fn get_complexity(options: &ComplexityOptions<'_>) -> Result<f64, EstimateError> {
    let target = ScoringTarget::select(options.document, options.operation_name);
    score_target(options.schema, &target, options.estimators, options.variables)
}

/// The operations a score covers, plus the fragments they may spread.
#[derive(Debug, Clone)]
pub struct ScoringTarget<'d> {
    operations: Vec<&'d Operation>,
    fragments: HashMap<&'d str, &'d Fragment>,
}

impl<'d> ScoringTarget<'d> {
    /// With a name, only operations carrying exactly that name are kept.
    pub fn select(document: &'d QueryDocument, name: Option<&str>) -> Self {
        let operations = operations(document)
            .filter(|op| name.is_none() || operation_name(op) == name)
            .collect();
        Self {
            operations,
            fragments: fragments(document),
        }
    }

    pub fn operations(&self) -> &[&'d Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Score a target. Errors are collected while walking; if any were
/// recorded the most recent one is returned.
pub fn score_target(
    schema: &Schema,
    target: &ScoringTarget<'_>,
    estimators: &[Estimator],
    variables: &Map<String, Value>,
) -> Result<f64, EstimateError> {
    let mut walker = Walker {
        schema,
        fragments: &target.fragments,
        estimators,
        variables: Map::new(),
        errors: Vec::new(),
        spreads: Vec::new(),
    };

    let mut complexity = 0.0;
    for op in &target.operations {
        match coerce_variable_values(schema, variable_definitions(op), variables) {
            Ok(coerced) => walker.variables = coerced,
            Err(errors) => {
                walker.errors.extend(errors.into_iter().map(EstimateError::Variable));
                continue;
            }
        }
        // Operations whose root type the schema lacks cost nothing.
        if let Some(root) = schema.root_type(operation_kind(op)) {
            complexity += walker.selection_set(selection_set(op), root);
        }
    }

    match walker.errors.pop() {
        Some(err) => Err(err),
        None => Ok(complexity),
    }
}

struct Walker<'a> {
    schema: &'a Schema,
    fragments: &'a HashMap<&'a str, &'a Fragment>,
    estimators: &'a [Estimator],
    variables: Map<String, Value>,
    errors: Vec<EstimateError>,
    /// Fragment names currently being expanded.
    spreads: Vec<String>,
}

impl<'a> Walker<'a> {
    /// Cost of a selection set on `type_def`: the largest total among the
    /// concrete types the set may resolve to.
    fn selection_set(&mut self, set: &SelectionSet<'static, String>, type_def: &'a TypeDef) -> f64 {
        let schema = self.schema;
        if set.items.is_empty() || !type_def.is_composite() {
            return 0.0;
        }

        let possible = schema.possible_types(&type_def.name);
        let mut totals: HashMap<&'a str, f64> = HashMap::new();

        for selection in &set.items {
            let directives = match selection {
                Selection::Field(field) => &field.directives,
                Selection::FragmentSpread(spread) => &spread.directives,
                Selection::InlineFragment(inline) => &inline.directives,
            };
            if !should_include(directives, &self.variables) {
                continue;
            }

            match selection {
                Selection::Field(field) => {
                    // Unknown fields, `__typename` included, cost nothing.
                    let Some(field_def) = type_def.field(&field.name) else {
                        continue;
                    };
                    let args = match argument_values(schema, field_def, &field.arguments, &self.variables) {
                        Ok(args) => args,
                        Err(message) => {
                            self.errors.push(EstimateError::Argument(message));
                            continue;
                        }
                    };
                    let child_complexity = match schema.get_type(field_def.ty.named_type()) {
                        Some(child) if child.is_composite() => self.selection_set(&field.selection_set, child),
                        _ => 0.0,
                    };
                    let estimator_args = EstimatorArgs {
                        parent_type: type_def,
                        field: field_def,
                        node: field,
                        args: &args,
                        child_complexity,
                    };
                    match first_estimate(self.estimators, &estimator_args) {
                        Ok(Some(cost)) => add_to(&mut totals, &possible, cost),
                        Ok(None) => self.errors.push(EstimateError::NoEstimate {
                            type_name: type_def.name.clone(),
                            field_name: field_def.name.clone(),
                        }),
                        Err(err) => self.errors.push(err),
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let Some(fragment) = self.fragments.get(name).copied() else {
                        continue;
                    };
                    if self.spreads.iter().any(|s| s == name) {
                        continue;
                    }
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    let Some(fragment_type) = schema.get_type(condition).filter(|t| t.is_composite()) else {
                        continue;
                    };
                    self.spreads.push(name.to_string());
                    let cost = self.selection_set(&fragment.selection_set, fragment_type);
                    self.spreads.pop();
                    add_to(&mut totals, &schema.possible_types(&fragment_type.name), cost);
                }
                Selection::InlineFragment(inline) => {
                    let fragment_type = match &inline.type_condition {
                        Some(TypeCondition::On(condition)) => {
                            match schema.get_type(condition).filter(|t| t.is_composite()) {
                                Some(t) => t,
                                None => continue,
                            }
                        }
                        None => type_def,
                    };
                    let cost = self.selection_set(&inline.selection_set, fragment_type);
                    add_to(&mut totals, &schema.possible_types(&fragment_type.name), cost);
                }
            }
        }

        totals.values().copied().fold(0.0, f64::max)
    }
}

/// First non-NaN answer in estimator order.
fn first_estimate(estimators: &[Estimator], args: &EstimatorArgs<'_>) -> Result<Option<f64>, EstimateError> {
    for estimator in estimators {
        if let Some(cost) = estimator.estimate(args)?.filter(|c| !c.is_nan()) {
            return Ok(Some(cost));
        }
    }
    Ok(None)
}

fn add_to<'a>(totals: &mut HashMap<&'a str, f64>, types: &[&'a str], cost: f64) {
    for &name in types {
        *totals.entry(name).or_insert(0.0) += cost;
    }
}
