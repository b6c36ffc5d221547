//! Projection of resolver output onto selection sets.

use costgate_core::document::{Fragment, should_include};
use costgate_core::response::PathSegment;
use costgate_core::schema::{Schema, TypeDef, TypeRef};
use costgate_core::GraphQLError;
use graphql_parser::query::{Field, Selection, SelectionSet, TypeCondition};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub type QueryField = Field<'static, String>;

/// Fields grouped by response key, in selection order.
pub type GroupedFields<'a> = Vec<(String, Vec<&'a QueryField>)>;

/// Marks a value that failed to complete. The error is already recorded;
/// the nearest nullable position becomes null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nulled;

pub struct Executor<'a> {
    schema: &'a Schema,
    fragments: HashMap<&'a str, &'a Fragment>,
    variables: &'a Map<String, Value>,
    errors: Vec<GraphQLError>,
}

impl<'a> Executor<'a> {
    pub fn new(
        schema: &'a Schema,
        fragments: HashMap<&'a str, &'a Fragment>,
        variables: &'a Map<String, Value>,
    ) -> Self {
        Self {
            schema,
            fragments,
            variables,
            errors: Vec::new(),
        }
    }

    pub fn variables(&self) -> &'a Map<String, Value> {
        self.variables
    }

    pub fn push_error(&mut self, error: GraphQLError) {
        self.errors.push(error);
    }

    pub fn into_errors(self) -> Vec<GraphQLError> {
        self.errors
    }

    /// Collect the fields of `set` that apply to `object_type`, honouring
    /// `@skip`/`@include` and fragment type conditions.
    pub fn collect_fields(&self, object_type: &TypeDef, set: &'a SelectionSet<'static, String>) -> GroupedFields<'a> {
        let mut grouped = Vec::new();
        let mut visited = Vec::new();
        self.collect_into(object_type, set, &mut grouped, &mut visited);
        grouped
    }

    fn collect_into(
        &self,
        object_type: &TypeDef,
        set: &'a SelectionSet<'static, String>,
        grouped: &mut GroupedFields<'a>,
        visited: &mut Vec<&'a str>,
    ) {
        for selection in &set.items {
            match selection {
                Selection::Field(field) => {
                    if !should_include(&field.directives, self.variables) {
                        continue;
                    }
                    let key = field.alias.as_ref().unwrap_or(&field.name);
                    match grouped.iter_mut().find(|(k, _)| k == key) {
                        Some((_, fields)) => fields.push(field),
                        None => grouped.push((key.clone(), vec![field])),
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if !should_include(&spread.directives, self.variables) || visited.contains(&name) {
                        continue;
                    }
                    visited.push(name);
                    let Some(fragment) = self.fragments.get(name).copied() else {
                        continue;
                    };
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    if self.applies(condition, object_type) {
                        self.collect_into(object_type, &fragment.selection_set, grouped, visited);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if !should_include(&inline.directives, self.variables) {
                        continue;
                    }
                    if let Some(TypeCondition::On(condition)) = &inline.type_condition
                        && !self.applies(condition, object_type)
                    {
                        continue;
                    }
                    self.collect_into(object_type, &inline.selection_set, grouped, visited);
                }
            }
        }
    }

    fn applies(&self, condition: &str, object_type: &TypeDef) -> bool {
        condition == object_type.name
            || self
                .schema
                .possible_types(condition)
                .contains(&object_type.name.as_str())
    }

    /// Complete `value` against `ty`.
    pub fn complete(
        &mut self,
        ty: &'a TypeRef,
        fields: &[&'a QueryField],
        value: &Value,
        path: &mut Vec<PathSegment>,
        label: &str,
    ) -> Result<Value, Nulled> {
        let schema = self.schema;
        match ty {
            TypeRef::NonNull(inner) => {
                let completed = self.complete(inner, fields, value, path, label)?;
                if completed.is_null() {
                    return self.fail(path, format!("Cannot return null for non-nullable field {label}."));
                }
                Ok(completed)
            }
            _ if value.is_null() => Ok(Value::Null),
            TypeRef::List(inner) => {
                let Value::Array(items) = value else {
                    return self.fail(
                        path,
                        format!("Expected Iterable, but did not find one for field \"{label}\"."),
                    );
                };
                let mut completed = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    let result = self.complete(inner, fields, item, path, label);
                    path.pop();
                    match result {
                        Ok(v) => completed.push(v),
                        Err(Nulled) if !inner.is_non_null() => completed.push(Value::Null),
                        Err(Nulled) => return Err(Nulled),
                    }
                }
                Ok(Value::Array(completed))
            }
            TypeRef::Named(name) => {
                let Some(type_def) = schema.get_type(name).filter(|t| t.is_composite()) else {
                    // Scalars and enums are passed through as returned.
                    return Ok(value.clone());
                };
                let Value::Object(object) = value else {
                    return self.fail(
                        path,
                        format!("Expected value of type \"{name}\" for field \"{label}\", found {value}."),
                    );
                };
                let runtime_type = if type_def.is_abstract() {
                    let possible = schema.possible_types(name);
                    let concrete = object
                        .get("__typename")
                        .and_then(Value::as_str)
                        .filter(|n| possible.contains(n))
                        .and_then(|n| schema.get_type(n));
                    match concrete {
                        Some(t) => t,
                        None => {
                            return self.fail(
                                path,
                                format!(
                                    "Abstract type \"{name}\" must resolve to an Object type at runtime for field \"{label}\"."
                                ),
                            );
                        }
                    }
                } else {
                    type_def
                };

                let mut grouped: GroupedFields<'a> = Vec::new();
                let mut visited = Vec::new();
                for field in fields {
                    self.collect_into(runtime_type, &field.selection_set, &mut grouped, &mut visited);
                }
                self.complete_object(runtime_type, &grouped, object, path)
            }
        }
    }

    fn complete_object(
        &mut self,
        object_type: &'a TypeDef,
        grouped: &GroupedFields<'a>,
        source: &Map<String, Value>,
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, Nulled> {
        let mut out = Map::new();
        for (key, fields) in grouped {
            let name = fields[0].name.as_str();
            if name == "__typename" {
                out.insert(key.clone(), Value::String(object_type.name.clone()));
                continue;
            }
            let Some(def) = object_type.field(name) else {
                continue;
            };
            let raw = source.get(name).unwrap_or(&Value::Null);
            let label = format!("{}.{}", object_type.name, name);

            path.push(PathSegment::Field(key.clone()));
            let result = self.complete(&def.ty, fields, raw, path, &label);
            path.pop();

            match result {
                Ok(v) => {
                    out.insert(key.clone(), v);
                }
                Err(Nulled) if !def.ty.is_non_null() => {
                    out.insert(key.clone(), Value::Null);
                }
                Err(Nulled) => return Err(Nulled),
            }
        }
        Ok(Value::Object(out))
    }

    fn fail(&mut self, path: &[PathSegment], message: String) -> Result<Value, Nulled> {
        self.errors.push(GraphQLError::new(message).with_path(path.to_vec()));
        Err(Nulled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgate_core::document::{find_operation, fragments, parse_query, selection_set};
    use serde_json::json;

    const SDL: &str = r#"
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String friends: [User!] }
        type Post implements Node { id: ID! title: String }
        union Item = User | Post
        type Query { me: User items: [Item] node: Node! }
    "#;

    /// Complete the root field `field` of `query` against `value`.
    fn project(query: &str, field: &str, value: Value) -> (Result<Value, Nulled>, Vec<GraphQLError>) {
        let schema = Schema::parse(SDL).unwrap();
        let document = parse_query(query).unwrap();
        let op = find_operation(&document, None).unwrap();
        let variables = Map::new();
        let mut executor = Executor::new(&schema, fragments(&document), &variables);
        let root = schema.query_type().unwrap();
        let grouped = executor.collect_fields(root, selection_set(op));
        let (key, fields) = grouped.iter().find(|(k, _)| k == field).unwrap();
        let def = root.field(&fields[0].name).unwrap();
        let mut path = vec![PathSegment::Field(key.clone())];
        let result = executor.complete(&def.ty, fields, &value, &mut path, "Query.x");
        (result, executor.into_errors())
    }

    #[test]
    fn projects_selected_fields_with_aliases() {
        let (result, errors) = project(
            "{ me { handle: name id } }",
            "me",
            json!({"id": "1", "name": "ann", "secret": true}),
        );
        assert!(errors.is_empty());
        assert_eq!(result.unwrap(), json!({"handle": "ann", "id": "1"}));
    }

    #[test]
    fn resolves_abstract_types_by_typename() {
        let (result, errors) = project(
            "{ items { __typename ... on User { name } ... on Post { title } } }",
            "items",
            json!([
                {"__typename": "User", "name": "ann", "title": "x"},
                {"__typename": "Post", "title": "hello"}
            ]),
        );
        assert!(errors.is_empty());
        assert_eq!(
            result.unwrap(),
            json!([
                {"__typename": "User", "name": "ann"},
                {"__typename": "Post", "title": "hello"}
            ])
        );
    }

    #[test]
    fn named_fragments_merge_fields() {
        let (result, _) = project(
            "{ me { ...A ...B } } fragment A on User { id } fragment B on Node { id name: id }",
            "me",
            json!({"id": "7"}),
        );
        assert_eq!(result.unwrap(), json!({"id": "7", "name": "7"}));
    }

    #[test]
    fn null_in_non_null_list_item_nulls_the_list() {
        let (result, errors) = project(
            "{ me { friends { id } } }",
            "me",
            json!({"friends": [{"id": "1"}, null]}),
        );
        assert_eq!(result.unwrap(), json!({"friends": null}));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].path,
            vec!["me".into(), "friends".into(), PathSegment::Index(1)]
        );
    }

    #[test]
    fn non_null_root_field_propagates() {
        let (result, errors) = project("{ node { id } }", "node", Value::Null);
        assert_eq!(result, Err(Nulled));
        assert_eq!(errors[0].message, "Cannot return null for non-nullable field Query.x.");
    }

    #[test]
    fn abstract_value_without_typename_is_an_error() {
        let (result, errors) = project("{ items { __typename } }", "items", json!([{"id": "1"}]));
        assert_eq!(result.unwrap(), json!([null]));
        assert!(errors[0].message.starts_with("Abstract type \"Item\" must resolve"));
    }

    #[test]
    fn skip_and_include_filter_fields() {
        let (result, _) = project(
            "{ me { id @skip(if: true) name @include(if: false) friends @include(if: true) { id } } }",
            "me",
            json!({"id": "1", "name": "n", "friends": []}),
        );
        assert_eq!(result.unwrap(), json!({"friends": []}));
    }
}
