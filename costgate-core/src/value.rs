//! Input values: AST literals to JSON, and coercion against schema types.
//!
//! Runtime values are `serde_json::Value` throughout; enum values are strings.

use crate::error::CostgateError;
use crate::schema::{FieldDef, Schema, TypeKind, TypeRef};
use graphql_parser::query::{Value as AstValue, VariableDefinition};
use serde_json::{Map, Number, Value};

/// Convert a constant literal (schema defaults, directive arguments).
pub fn const_to_json(value: &AstValue<'_, String>) -> Result<Value, CostgateError> {
    Ok(match value {
        AstValue::Variable(name) => {
            return Err(CostgateError::Schema(format!(
                "Unexpected variable \"${name}\" in constant value."
            )));
        }
        AstValue::Int(n) => n.as_i64().map(Value::from).unwrap_or(Value::Null),
        AstValue::Float(f) => float_to_json(*f),
        AstValue::String(s) => Value::String(s.clone()),
        AstValue::Boolean(b) => Value::Bool(*b),
        AstValue::Null => Value::Null,
        AstValue::Enum(e) => Value::String(e.clone()),
        AstValue::List(items) => Value::Array(items.iter().map(const_to_json).collect::<Result<_, _>>()?),
        AstValue::Object(fields) => {
            let mut out = Map::new();
            for (k, v) in fields {
                out.insert(k.clone(), const_to_json(v)?);
            }
            Value::Object(out)
        }
    })
}

/// Convert a query literal, substituting variables. Unset variables become null.
pub fn literal_to_json(value: &AstValue<'_, String>, variables: &Map<String, Value>) -> Value {
    match value {
        AstValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        AstValue::Int(n) => n.as_i64().map(Value::from).unwrap_or(Value::Null),
        AstValue::Float(f) => float_to_json(*f),
        AstValue::String(s) => Value::String(s.clone()),
        AstValue::Boolean(b) => Value::Bool(*b),
        AstValue::Null => Value::Null,
        AstValue::Enum(e) => Value::String(e.clone()),
        AstValue::List(items) => Value::Array(items.iter().map(|v| literal_to_json(v, variables)).collect()),
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), literal_to_json(v, variables)))
                .collect(),
        ),
    }
}

fn float_to_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Coerce a runtime value to `ty`. The error is a bare reason; callers add context.
pub fn coerce_input_value(schema: &Schema, value: &Value, ty: &TypeRef) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(format!("Expected non-nullable type \"{ty}\" not to be null."));
            }
            coerce_input_value(schema, value, inner)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input_value(schema, item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // A single value is accepted where a list is expected.
            single => Ok(Value::Array(vec![coerce_input_value(schema, single, inner)?])),
        },
        TypeRef::Named(name) => coerce_named(schema, value, name),
    }
}

fn coerce_named(schema: &Schema, value: &Value, name: &str) -> Result<Value, String> {
    let type_def = schema
        .get_type(name)
        .ok_or_else(|| format!("Unknown type \"{name}\"."))?;

    match &type_def.kind {
        TypeKind::Scalar => coerce_scalar(name, value),
        TypeKind::Enum { values } => match value {
            Value::String(s) if values.iter().any(|v| v == s) => Ok(value.clone()),
            _ => Err(format!("Value {value} does not exist in \"{name}\" enum.")),
        },
        TypeKind::InputObject { fields } => {
            let Value::Object(object) = value else {
                return Err(format!("Expected type \"{name}\" to be an object."));
            };
            if let Some(unknown) = object
                .keys()
                .find(|k| !fields.iter().any(|f| &f.name == *k))
            {
                return Err(format!("Field \"{unknown}\" is not defined by type \"{name}\"."));
            }
            let mut out = Map::new();
            for field in fields {
                match object.get(&field.name) {
                    Some(v) => {
                        out.insert(field.name.clone(), coerce_input_value(schema, v, &field.ty)?);
                    }
                    None => match &field.default_value {
                        Some(default) => {
                            out.insert(field.name.clone(), default.clone());
                        }
                        None if field.ty.is_non_null() => {
                            return Err(format!(
                                "Field \"{}\" of required type \"{}\" was not provided.",
                                field.name, field.ty
                            ));
                        }
                        None => {}
                    },
                }
            }
            Ok(Value::Object(out))
        }
        _ => Err(format!("Type \"{name}\" is not an input type.")),
    }
}

fn coerce_scalar(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => {
            let as_int = value.as_i64().or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            });
            match as_int {
                Some(i) if i32::try_from(i).is_ok() => Ok(Value::from(i)),
                _ => Err(format!("Int cannot represent non-integer value: {value}")),
            }
        }
        "Float" => match value {
            Value::Number(_) => Ok(value.clone()),
            _ => Err(format!("Float cannot represent non numeric value: {value}")),
        },
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(format!("String cannot represent a non string value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        // Custom scalars pass through untouched.
        _ => Ok(value.clone()),
    }
}

/// Coerce request variables against an operation's variable definitions.
///
/// Defaults are applied for absent variables. All problems are collected.
pub fn coerce_variable_values(
    schema: &Schema,
    definitions: &[VariableDefinition<'_, String>],
    inputs: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<String>> {
    let mut coerced = Map::new();
    let mut errors = Vec::new();

    for def in definitions {
        let name = &def.name;
        let ty = TypeRef::from_ast(&def.var_type);

        if !schema.get_type(ty.named_type()).is_some_and(|t| t.is_input()) {
            errors.push(format!(
                "Variable \"${name}\" expected value of type \"{ty}\" which cannot be used as an input type."
            ));
            continue;
        }

        match inputs.get(name) {
            None => match &def.default_value {
                Some(default) => {
                    let coerced_default = const_to_json(default)
                        .map_err(|e| e.to_string())
                        .and_then(|v| {
                            coerce_input_value(schema, &v, &ty).map_err(|reason| {
                                format!("Variable \"${name}\" has invalid default value {v}; {reason}")
                            })
                        });
                    match coerced_default {
                        Ok(v) => {
                            coerced.insert(name.clone(), v);
                        }
                        Err(e) => errors.push(e),
                    }
                }
                None if ty.is_non_null() => errors.push(format!(
                    "Variable \"${name}\" of required type \"{ty}\" was not provided."
                )),
                None => {}
            },
            Some(Value::Null) if ty.is_non_null() => errors.push(format!(
                "Variable \"${name}\" of non-null type \"{ty}\" must not be null."
            )),
            Some(value) => match coerce_input_value(schema, value, &ty) {
                Ok(v) => {
                    coerced.insert(name.clone(), v);
                }
                Err(reason) => errors.push(format!(
                    "Variable \"${name}\" got invalid value {value}; {reason}"
                )),
            },
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Resolve a field's argument values from its AST arguments and the
/// already-coerced variables. Defaults from the field definition apply.
pub fn argument_values(
    schema: &Schema,
    field: &FieldDef,
    arguments: &[(String, AstValue<'_, String>)],
    variables: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut out = Map::new();

    for arg in &field.arguments {
        let name = &arg.name;
        let ty = &arg.ty;
        let provided = arguments.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        match provided {
            Some(AstValue::Variable(var)) if !variables.contains_key(var) => {
                if let Some(default) = &arg.default_value {
                    out.insert(name.clone(), default.clone());
                } else if ty.is_non_null() {
                    return Err(format!(
                        "Argument \"{name}\" of required type \"{ty}\" was provided the variable \"${var}\" which was not provided a runtime value."
                    ));
                }
            }
            Some(AstValue::Variable(var)) => {
                let value = &variables[var.as_str()];
                if value.is_null() && ty.is_non_null() {
                    return Err(format!("Argument \"{name}\" of non-null type \"{ty}\" must not be null."));
                }
                out.insert(name.clone(), value.clone());
            }
            Some(AstValue::Null) if ty.is_non_null() => {
                return Err(format!("Argument \"{name}\" of non-null type \"{ty}\" must not be null."));
            }
            Some(literal) => {
                let raw = literal_to_json(literal, variables);
                let coerced = coerce_input_value(schema, &raw, ty)
                    .map_err(|_| format!("Argument \"{name}\" has invalid value {raw}."))?;
                out.insert(name.clone(), coerced);
            }
            None => {
                if let Some(default) = &arg.default_value {
                    out.insert(name.clone(), default.clone());
                } else if ty.is_non_null() {
                    return Err(format!("Argument \"{name}\" of required type \"{ty}\" was not provided."));
                }
            }
        }
    }

    Ok(out)
}
