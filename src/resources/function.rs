//! The `borealis_function` resource.
//!
//! User-defined functions are the one built-in kind whose identifier
//! carries an argument signature: two functions in the same schema may
//! share a name and differ only in argument types, so the signature is
//! part of the identity and changing it replaces the object. The body has
//! no show column and is recovered from the reconstructed DDL.
//!
//! Two generations of stored records predate the current encoding: v0
//! records lack the argument list entirely and v1 records carry a
//! dot-qualified identifier. The migrator chain upgrades both.

use serde_json::{Map, Value};

use crate::client::ObjectKind;
use crate::drift::{ReadSurfaces, TextProbe};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::{append_empty_arguments, reencode_qualified_identifier, Migrator};
use crate::schema::{AttributeDescriptor, ResourceSchema, SemanticType};
use crate::suppress::{enum_normalization, statement_whitespace};
use crate::value::eq_ignore_case;

use super::{require_text, valid_object_name, ResourceDefinition};

const LANGUAGES: &[&str] = &["SQL", "JAVASCRIPT", "PYTHON", "JAVA", "SCALA"];

fn valid_language(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if LANGUAGES.iter().any(|l| eq_ignore_case(l, s)) => Ok(()),
        Some(s) => Err(format!("unknown function language {s:?}")),
        None => Err("must be a string".to_string()),
    }
}

fn function_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    let arguments = match config.get("arguments") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ServiceError::InvalidArgument(
                        "argument types must be strings".to_string(),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(ServiceError::InvalidArgument(format!(
                "arguments must be a list of type names, got {other}"
            )))
        }
    };
    Ok(ObjectIdentifier::schema_object_with_arguments(
        require_text(config, "database")?,
        require_text(config, "schema")?,
        require_text(config, "name")?,
        arguments,
    ))
}

/// Build the function resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(2)
        .with_attribute(
            "database",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_force_new(),
        )
        .with_attribute(
            "schema",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_force_new(),
        )
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .renaming()
                .with_validator(valid_object_name),
        )
        .with_attribute(
            "arguments",
            AttributeDescriptor::new(SemanticType::list(SemanticType::Text))
                .optional()
                .with_force_new()
                .with_description("Argument type names, in order; part of the identity."),
        )
        .with_attribute(
            "return_type",
            AttributeDescriptor::text()
                .required()
                .with_suppressor(enum_normalization)
                .with_force_new(),
        )
        .with_attribute(
            "language",
            AttributeDescriptor::text()
                .optional()
                .with_validator(valid_language)
                .with_suppressor(enum_normalization)
                .with_force_new()
                .with_description("Implementation language; empty means SQL."),
        )
        .with_attribute(
            "body",
            AttributeDescriptor::text()
                .required()
                .with_suppressor(statement_whitespace)
                .in_flow("definition")
                .with_description("Function body, replaced as a whole on change."),
        )
        .with_attribute("is_secure", AttributeDescriptor::tri_state().optional())
        .with_attribute("comment", AttributeDescriptor::text().optional());

    Ok(ResourceDefinition {
        type_name: "borealis_function",
        kind: ObjectKind::Function,
        schema,
        probes: vec![TextProbe::new(
            "body",
            "definition",
            r"(?is)\bAS\b\s*\$\$(.*?)\$\$",
        )?],
        surfaces: ReadSurfaces {
            describe: true,
            parameters: false,
        },
        migrator: Migrator::new()
            .with_upgrader(0, append_empty_arguments)
            .with_upgrader(1, reencode_qualified_identifier),
        convergence: None,
        id_from_config: function_id,
    })
}
