//! Executable documents: parsing and operation lookup.

use crate::error::CostgateError;
use crate::value::literal_to_json;
use graphql_parser::query::{
    Definition, Directive, Document, FragmentDefinition, OperationDefinition, SelectionSet,
    VariableDefinition,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A parsed executable document that owns all of its strings.
pub type QueryDocument = Document<'static, String>;
pub type Operation = OperationDefinition<'static, String>;
pub type Fragment = FragmentDefinition<'static, String>;

pub fn parse_query(source: &str) -> Result<QueryDocument, CostgateError> {
    graphql_parser::parse_query::<String>(source)
        .map(|doc| doc.into_static())
        .map_err(|e| CostgateError::Parse(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn operation_kind(op: &Operation) -> OperationKind {
    match op {
        OperationDefinition::SelectionSet(_) | OperationDefinition::Query(_) => OperationKind::Query,
        OperationDefinition::Mutation(_) => OperationKind::Mutation,
        OperationDefinition::Subscription(_) => OperationKind::Subscription,
    }
}

pub fn operation_name(op: &Operation) -> Option<&str> {
    match op {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

pub fn variable_definitions(op: &Operation) -> &[VariableDefinition<'static, String>] {
    match op {
        OperationDefinition::SelectionSet(_) => &[],
        OperationDefinition::Query(q) => &q.variable_definitions,
        OperationDefinition::Mutation(m) => &m.variable_definitions,
        OperationDefinition::Subscription(s) => &s.variable_definitions,
    }
}

pub fn selection_set(op: &Operation) -> &SelectionSet<'static, String> {
    match op {
        OperationDefinition::SelectionSet(s) => s,
        OperationDefinition::Query(q) => &q.selection_set,
        OperationDefinition::Mutation(m) => &m.selection_set,
        OperationDefinition::Subscription(s) => &s.selection_set,
    }
}

pub fn operations(document: &QueryDocument) -> impl Iterator<Item = &Operation> {
    document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    })
}

/// Fragment definitions by name.
pub fn fragments(document: &QueryDocument) -> HashMap<&str, &Fragment> {
    document
        .definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Fragment(f) => Some((f.name.as_str(), f)),
            Definition::Operation(_) => None,
        })
        .collect()
}

/// Why an operation could not be selected from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationLookupError {
    NoOperation,
    NameRequired,
    Unknown(String),
}

impl fmt::Display for OperationLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationLookupError::NoOperation => f.write_str("Must provide an operation."),
            OperationLookupError::NameRequired => f.write_str(
                "Must provide operation name if query contains multiple operations.",
            ),
            OperationLookupError::Unknown(name) => write!(f, "Unknown operation named \"{name}\"."),
        }
    }
}

impl std::error::Error for OperationLookupError {}

/// Pick the operation a request executes.
///
/// With a name, the operation of that name; without one, the document must
/// contain exactly one operation.
pub fn find_operation<'d>(
    document: &'d QueryDocument,
    name: Option<&str>,
) -> Result<&'d Operation, OperationLookupError> {
    match name {
        Some(name) => operations(document)
            .find(|op| operation_name(op) == Some(name))
            .ok_or_else(|| OperationLookupError::Unknown(name.to_string())),
        None => {
            let mut ops = operations(document);
            let first = ops.next().ok_or(OperationLookupError::NoOperation)?;
            if ops.next().is_some() {
                return Err(OperationLookupError::NameRequired);
            }
            Ok(first)
        }
    }
}

/// Evaluate `@skip(if:)` / `@include(if:)`. Conditions that are not booleans are ignored.
pub fn should_include(directives: &[Directive<'_, String>], variables: &Map<String, Value>) -> bool {
    let mut include = true;
    let mut skip = false;
    for directive in directives {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| literal_to_json(value, variables));
        match (directive.name.as_str(), condition) {
            ("include", Some(Value::Bool(b))) => include = b,
            ("skip", Some(Value::Bool(b))) => skip = b,
            _ => {}
        }
    }
    include && !skip
}
