//! The `borealis_schema` resource.
//!
//! Schemas live inside a database, so this is the one built-in kind whose
//! identifier is database-qualified. Moving a schema between databases is
//! not expressible as an alter and forces replacement; renaming within the
//! database is an in-place rename. Managed access can be toggled freely.

use serde_json::{json, Map, Value};

use crate::client::ObjectKind;
use crate::drift::ReadSurfaces;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, ResourceSchema};

use super::{require_text, valid_object_name, ResourceDefinition};

fn schema_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::database(
        require_text(config, "database")?,
        require_text(config, "name")?,
    ))
}

/// Build the schema resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(0)
        .with_attribute(
            "database",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_force_new()
                .with_description("Parent database; schemas cannot move between databases."),
        )
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .renaming()
                .with_validator(valid_object_name),
        )
        .with_attribute(
            "with_managed_access",
            AttributeDescriptor::tri_state()
                .optional()
                .with_description("Centralize grant management with the schema owner."),
        )
        .with_attribute(
            "data_retention_time_in_days",
            AttributeDescriptor::integer()
                .optional()
                .with_unset_fallback(json!(1))
                .with_description("Time-travel window in days; -1 inherits the database setting."),
        )
        .with_attribute(
            "is_transient",
            AttributeDescriptor::tri_state().optional().with_force_new(),
        )
        .with_attribute("comment", AttributeDescriptor::text().optional());

    Ok(ResourceDefinition {
        type_name: "borealis_schema",
        kind: ObjectKind::Schema,
        schema,
        probes: Vec::new(),
        surfaces: ReadSurfaces {
            describe: false,
            parameters: true,
        },
        migrator: Migrator::new(),
        convergence: None,
        id_from_config: schema_id,
    })
}
