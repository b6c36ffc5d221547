use async_trait::async_trait;
use costgate_core::document::OperationKind;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A root field about to be resolved.
pub struct RootField<'a> {
    pub operation: OperationKind,
    /// Name of the root type, e.g. `Query`.
    pub parent_type: &'a str,
    pub field_name: &'a str,
    /// Alias if one was given, otherwise the field name.
    pub response_key: &'a str,
    /// Coerced argument values, defaults applied.
    pub arguments: &'a Map<String, Value>,
}

/// Produces the value of a root field.
///
/// The returned JSON is projected onto the field's selection set: objects
/// carry nested field values under their field names, and objects of
/// abstract types name their concrete type in `__typename`.
///
/// Errors that downcast to `GraphQLError` are reported as-is; anything else
/// is reported with code `INTERNAL_SERVER_ERROR`.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, field: &RootField<'_>) -> anyhow::Result<Value>;
}

/// Serves root fields from a fixed JSON object. Unknown fields are null.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    values: HashMap<String, Value>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object keyed by root field name.
    pub fn from_object(root: Map<String, Value>) -> Self {
        Self {
            values: root.into_iter().collect(),
        }
    }

    pub fn with_value(mut self, field_name: &str, value: Value) -> Self {
        self.values.insert(field_name.to_string(), value);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, field: &RootField<'_>) -> anyhow::Result<Value> {
        Ok(self.values.get(field.field_name).cloned().unwrap_or(Value::Null))
    }
}
