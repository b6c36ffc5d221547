//! Owned schema model built from SDL.
//!
//! Only what request processing needs is kept: types, fields, arguments,
//! default values and directive applications. Constant values (directive
//! arguments, defaults) are stored as JSON.

use crate::document::OperationKind;
use crate::error::CostgateError;
use crate::value::const_to_json;
use graphql_parser::schema as ast;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

const BUILTIN_SCALARS: &[&str] = &["Int", "Float", "String", "Boolean", "ID"];

/// A reference to a type as written in a field or argument definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn from_ast(ty: &ast::Type<'_, String>) -> Self {
        match ty {
            ast::Type::NamedType(name) => TypeRef::Named(name.clone()),
            ast::Type::ListType(inner) => TypeRef::List(Box::new(TypeRef::from_ast(inner))),
            ast::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(TypeRef::from_ast(inner))),
        }
    }

    /// The innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// Strip one level of non-null, if present.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A directive applied in the schema, with constant arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveUse {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl DirectiveUse {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub arguments: Vec<InputValueDef>,
    pub ty: TypeRef,
    pub directives: Vec<DirectiveUse>,
}

impl FieldDef {
    pub fn directive(&self, name: &str) -> Option<&DirectiveUse> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValueDef> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar,
    Object {
        fields: Vec<FieldDef>,
        interfaces: Vec<String>,
    },
    Interface {
        fields: Vec<FieldDef>,
    },
    Union {
        members: Vec<String>,
    },
    Enum {
        values: Vec<String>,
    },
    InputObject {
        fields: Vec<InputValueDef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub directives: Vec<DirectiveUse>,
}

impl TypeDef {
    /// Output fields; empty for anything but objects and interfaces.
    pub fn fields(&self) -> &[FieldDef] {
        match &self.kind {
            TypeKind::Object { fields, .. } | TypeKind::Interface { fields } => fields,
            _ => &[],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object { .. })
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object { .. } | TypeKind::Interface { .. } | TypeKind::Union { .. }
        )
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface { .. } | TypeKind::Union { .. })
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Scalar | TypeKind::Enum { .. } | TypeKind::InputObject { .. }
        )
    }
}

/// An executable schema definition.
#[derive(Debug, Clone)]
pub struct Schema {
    types: HashMap<String, TypeDef>,
    /// Definition order, for deterministic possible-type listings.
    order: Vec<String>,
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Schema {
    /// Parse SDL into a schema.
    pub fn parse(sdl: &str) -> Result<Self, CostgateError> {
        let document = graphql_parser::parse_schema::<String>(sdl)
            .map_err(|e| CostgateError::Parse(e.to_string()))?;
        Self::from_document(&document)
    }

    pub fn from_document(document: &ast::Document<'_, String>) -> Result<Self, CostgateError> {
        let mut schema = Schema {
            types: HashMap::new(),
            order: Vec::new(),
            query_type: None,
            mutation_type: None,
            subscription_type: None,
        };

        for name in BUILTIN_SCALARS {
            schema.insert(TypeDef {
                name: name.to_string(),
                kind: TypeKind::Scalar,
                directives: Vec::new(),
            });
        }

        let mut schema_definition = None;
        for definition in &document.definitions {
            match definition {
                ast::Definition::TypeDefinition(def) => {
                    let type_def = convert_type_definition(def)?;
                    if schema.types.contains_key(&type_def.name)
                        && !BUILTIN_SCALARS.contains(&type_def.name.as_str())
                    {
                        return Err(CostgateError::Schema(format!(
                            "There can be only one type named \"{}\".",
                            type_def.name
                        )));
                    }
                    schema.insert(type_def);
                }
                ast::Definition::SchemaDefinition(def) => {
                    if schema_definition.is_some() {
                        return Err(CostgateError::Schema(
                            "Must provide only one schema definition.".into(),
                        ));
                    }
                    schema_definition = Some(def);
                }
                ast::Definition::TypeExtension(_) | ast::Definition::DirectiveDefinition(_) => {}
            }
        }

        // Extensions apply after all base definitions are known.
        for definition in &document.definitions {
            if let ast::Definition::TypeExtension(ext) = definition {
                schema.apply_extension(ext)?;
            }
        }

        match schema_definition {
            Some(def) => {
                schema.query_type = def.query.clone();
                schema.mutation_type = def.mutation.clone();
                schema.subscription_type = def.subscription.clone();
            }
            None => {
                for (slot, name) in [
                    (&mut schema.query_type, "Query"),
                    (&mut schema.mutation_type, "Mutation"),
                    (&mut schema.subscription_type, "Subscription"),
                ] {
                    if schema.types.contains_key(name) {
                        *slot = Some(name.to_string());
                    }
                }
            }
        }

        schema.check()?;
        Ok(schema)
    }

    fn insert(&mut self, type_def: TypeDef) {
        if !self.types.contains_key(&type_def.name) {
            self.order.push(type_def.name.clone());
        }
        self.types.insert(type_def.name.clone(), type_def);
    }

    fn apply_extension(&mut self, ext: &ast::TypeExtension<'_, String>) -> Result<(), CostgateError> {
        let name = match ext {
            ast::TypeExtension::Scalar(e) => &e.name,
            ast::TypeExtension::Object(e) => &e.name,
            ast::TypeExtension::Interface(e) => &e.name,
            ast::TypeExtension::Union(e) => &e.name,
            ast::TypeExtension::Enum(e) => &e.name,
            ast::TypeExtension::InputObject(e) => &e.name,
        };
        let target = self.types.get_mut(name).ok_or_else(|| {
            CostgateError::Schema(format!("Cannot extend type \"{name}\" because it is not defined."))
        })?;

        match (ext, &mut target.kind) {
            (ast::TypeExtension::Scalar(e), TypeKind::Scalar) => {
                target.directives.extend(convert_directives(&e.directives)?);
            }
            (ast::TypeExtension::Object(e), TypeKind::Object { fields, interfaces }) => {
                fields.extend(convert_fields(&e.fields)?);
                interfaces.extend(e.implements_interfaces.iter().cloned());
                target.directives.extend(convert_directives(&e.directives)?);
            }
            (ast::TypeExtension::Interface(e), TypeKind::Interface { fields }) => {
                fields.extend(convert_fields(&e.fields)?);
                target.directives.extend(convert_directives(&e.directives)?);
            }
            (ast::TypeExtension::Union(e), TypeKind::Union { members }) => {
                members.extend(e.types.iter().cloned());
                target.directives.extend(convert_directives(&e.directives)?);
            }
            (ast::TypeExtension::Enum(e), TypeKind::Enum { values }) => {
                values.extend(e.values.iter().map(|v| v.name.clone()));
                target.directives.extend(convert_directives(&e.directives)?);
            }
            (ast::TypeExtension::InputObject(e), TypeKind::InputObject { fields }) => {
                fields.extend(convert_input_values(&e.fields)?);
                target.directives.extend(convert_directives(&e.directives)?);
            }
            _ => {
                return Err(CostgateError::Schema(format!(
                    "Cannot extend non-matching type \"{name}\"."
                )));
            }
        }
        Ok(())
    }

    /// Every referenced type must exist and root types must be objects.
    fn check(&self) -> Result<(), CostgateError> {
        let query = self
            .query_type
            .as_deref()
            .ok_or_else(|| CostgateError::Schema("Query root type must be provided.".into()))?;

        for root in [Some(query), self.mutation_type.as_deref(), self.subscription_type.as_deref()]
            .into_iter()
            .flatten()
        {
            match self.types.get(root) {
                Some(t) if t.is_object() => {}
                _ => {
                    return Err(CostgateError::Schema(format!(
                        "Root type \"{root}\" must be a defined object type."
                    )));
                }
            }
        }

        for name in &self.order {
            let type_def = &self.types[name];
            let mut referenced: Vec<&str> = Vec::new();
            match &type_def.kind {
                TypeKind::Object { fields, interfaces } => {
                    referenced.extend(interfaces.iter().map(String::as_str));
                    collect_field_refs(fields, &mut referenced);
                }
                TypeKind::Interface { fields } => collect_field_refs(fields, &mut referenced),
                TypeKind::Union { members } => referenced.extend(members.iter().map(String::as_str)),
                TypeKind::InputObject { fields } => {
                    referenced.extend(fields.iter().map(|f| f.ty.named_type()));
                }
                TypeKind::Scalar | TypeKind::Enum { .. } => {}
            }
            if let Some(missing) = referenced.iter().find(|r| !self.types.contains_key(**r)) {
                return Err(CostgateError::Schema(format!(
                    "Unknown type \"{missing}\" referenced by \"{name}\"."
                )));
            }
        }
        Ok(())
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn query_type(&self) -> Option<&TypeDef> {
        self.query_type.as_deref().and_then(|n| self.get_type(n))
    }

    pub fn mutation_type(&self) -> Option<&TypeDef> {
        self.mutation_type.as_deref().and_then(|n| self.get_type(n))
    }

    pub fn subscription_type(&self) -> Option<&TypeDef> {
        self.subscription_type.as_deref().and_then(|n| self.get_type(n))
    }

    pub fn root_type(&self, kind: OperationKind) -> Option<&TypeDef> {
        match kind {
            OperationKind::Query => self.query_type(),
            OperationKind::Mutation => self.mutation_type(),
            OperationKind::Subscription => self.subscription_type(),
        }
    }

    /// Concrete object types a value of `name` may have at runtime.
    pub fn possible_types(&self, name: &str) -> Vec<&str> {
        let Some(type_def) = self.get_type(name) else {
            return Vec::new();
        };
        match &type_def.kind {
            TypeKind::Object { .. } => vec![type_def.name.as_str()],
            TypeKind::Union { members } => members.iter().map(String::as_str).collect(),
            TypeKind::Interface { .. } => self
                .order
                .iter()
                .filter_map(|n| self.types.get(n))
                .filter(|t| match &t.kind {
                    TypeKind::Object { interfaces, .. } => interfaces.iter().any(|i| i == name),
                    _ => false,
                })
                .map(|t| t.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of named types, built-in scalars included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn collect_field_refs<'s>(fields: &'s [FieldDef], out: &mut Vec<&'s str>) {
    for field in fields {
        out.push(field.ty.named_type());
        out.extend(field.arguments.iter().map(|a| a.ty.named_type()));
    }
}

fn convert_type_definition(def: &ast::TypeDefinition<'_, String>) -> Result<TypeDef, CostgateError> {
    let (name, kind, directives) = match def {
        ast::TypeDefinition::Scalar(t) => (&t.name, TypeKind::Scalar, &t.directives),
        ast::TypeDefinition::Object(t) => (
            &t.name,
            TypeKind::Object {
                fields: convert_fields(&t.fields)?,
                interfaces: t.implements_interfaces.clone(),
            },
            &t.directives,
        ),
        ast::TypeDefinition::Interface(t) => (
            &t.name,
            TypeKind::Interface {
                fields: convert_fields(&t.fields)?,
            },
            &t.directives,
        ),
        ast::TypeDefinition::Union(t) => (
            &t.name,
            TypeKind::Union {
                members: t.types.clone(),
            },
            &t.directives,
        ),
        ast::TypeDefinition::Enum(t) => (
            &t.name,
            TypeKind::Enum {
                values: t.values.iter().map(|v| v.name.clone()).collect(),
            },
            &t.directives,
        ),
        ast::TypeDefinition::InputObject(t) => (
            &t.name,
            TypeKind::InputObject {
                fields: convert_input_values(&t.fields)?,
            },
            &t.directives,
        ),
    };
    Ok(TypeDef {
        name: name.clone(),
        kind,
        directives: convert_directives(directives)?,
    })
}

fn convert_fields(fields: &[ast::Field<'_, String>]) -> Result<Vec<FieldDef>, CostgateError> {
    fields
        .iter()
        .map(|f| {
            Ok(FieldDef {
                name: f.name.clone(),
                arguments: convert_input_values(&f.arguments)?,
                ty: TypeRef::from_ast(&f.field_type),
                directives: convert_directives(&f.directives)?,
            })
        })
        .collect()
}

fn convert_input_values(
    values: &[ast::InputValue<'_, String>],
) -> Result<Vec<InputValueDef>, CostgateError> {
    values
        .iter()
        .map(|v| {
            Ok(InputValueDef {
                name: v.name.clone(),
                ty: TypeRef::from_ast(&v.value_type),
                default_value: v.default_value.as_ref().map(const_to_json).transpose()?,
            })
        })
        .collect()
}

fn convert_directives(
    directives: &[ast::Directive<'_, String>],
) -> Result<Vec<DirectiveUse>, CostgateError> {
    directives
        .iter()
        .map(|d| {
            let mut arguments = Map::new();
            for (name, value) in &d.arguments {
                arguments.insert(name.clone(), const_to_json(value)?);
            }
            Ok(DirectiveUse {
                name: d.name.clone(),
                arguments,
            })
        })
        .collect()
}
