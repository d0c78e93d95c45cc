//! Config validation against a resource schema.
//!
//! Validates a configuration value against the attribute descriptors of a
//! [`ResourceSchema`] before any remote call is made. Returns a list of
//! diagnostics; an empty list means the configuration is acceptable.
//!
//! Rules:
//!
//! - required attributes must be present and non-null;
//! - computed-only attributes are skipped (the drift reader sets those);
//! - values must match the declared semantic type (tri-states are the
//!   strings `"true"`/`"false"`/`"default"`);
//! - per-attribute validator hooks run after the type check;
//! - lists, sets, and records are checked element-wise with
//!   `path.index.subfield` diagnostics.

use serde_json::Value;

use crate::schema::{
    AttributeDescriptor, Diagnostic, DiagnosticSeverity, ResourceSchema, SemanticType,
};
use crate::value::TriStateBool;

/// Validate a configuration value against a schema.
pub fn validate(schema: &ResourceSchema, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let obj = match config {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected a configuration object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        }
    };

    for (name, descriptor) in &schema.attributes {
        if descriptor.computed && !descriptor.optional && !descriptor.required {
            continue;
        }
        match obj.get(name) {
            None | Some(Value::Null) => {
                if descriptor.required {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{name}'"))
                            .with_attribute(name),
                    );
                }
            }
            Some(value) => validate_attribute(descriptor, value, name, &mut diagnostics),
        }
    }
    diagnostics
}

/// Validate and return `Ok` only when no error diagnostics were produced.
pub fn validate_result(schema: &ResourceSchema, config: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, config);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

fn validate_attribute(
    descriptor: &AttributeDescriptor,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    validate_type(&descriptor.semantic_type, value, path, diagnostics);
    if let Some(validator) = descriptor.validator {
        // Sentinels mean "unset"; validator hooks only see real values.
        if !descriptor.is_unset(Some(value)) {
            if let Err(message) = validator(value) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{path}'"))
                        .with_detail(message)
                        .with_attribute(path),
                );
            }
        }
    }
}

fn validate_type(
    semantic_type: &SemanticType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match semantic_type {
        SemanticType::Text => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "text", value));
            }
        }
        SemanticType::Integer => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "integer", value));
            }
        }
        SemanticType::Float => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float", value));
            }
        }
        SemanticType::TriStateBool => match value.as_str() {
            Some(text) if TriStateBool::parse(text).is_ok() => {}
            _ => {
                diagnostics.push(
                    Diagnostic {
                        severity: DiagnosticSeverity::Error,
                        summary: format!("Invalid type for attribute '{path}'"),
                        detail: Some(format!(
                            "Expected \"true\", \"false\" or \"default\", got {value}"
                        )),
                        attribute: Some(path.to_string()),
                    },
                );
            }
        },
        SemanticType::List(element) | SemanticType::Set(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{path}.{i}"), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, semantic_type.name(), value)),
        },
        SemanticType::Record(fields) => match value.as_object() {
            Some(obj) => {
                for (field, field_type) in fields {
                    if let Some(field_value) = obj.get(field) {
                        validate_type(
                            field_type,
                            field_value,
                            &format!("{path}.{field}"),
                            diagnostics,
                        );
                    }
                }
            }
            None => diagnostics.push(type_error(path, "record", value)),
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{path}'"),
        detail: Some(format!("Expected {}, got {}", expected, value_type_name(got))),
        attribute: Some(path.to_string()),
    }
}
