//! The `borealis_warehouse` resource.
//!
//! Warehouses are account-level objects. The Service reports most of their
//! fields as show columns and the tunables as object parameters; there is
//! no separate describe surface worth composing. Sizing tunables use the
//! integer unset sentinel, and where the Service offers no UNSET the
//! documented default is SET instead.

use serde_json::{json, Map, Value};

use crate::client::ObjectKind;
use crate::drift::ReadSurfaces;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, ResourceSchema};
use crate::suppress::{enum_normalization, ignore_change_to_remote_value};
use crate::value::eq_ignore_case;

use super::{require_text, valid_object_name, ResourceDefinition};

const SIZES: &[&str] = &[
    "XSMALL", "SMALL", "MEDIUM", "LARGE", "XLARGE", "XXLARGE", "XXXLARGE",
];

fn valid_size(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if SIZES.iter().any(|size| eq_ignore_case(size, s)) => Ok(()),
        Some(s) => Err(format!("unknown warehouse size {s:?}")),
        None => Err("must be a string".to_string()),
    }
}

fn warehouse_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::account(require_text(config, "name")?))
}

/// Build the warehouse resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(1)
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .renaming()
                .with_validator(valid_object_name)
                .with_description("Warehouse name; changing it renames the object in place."),
        )
        .with_attribute(
            "warehouse_size",
            AttributeDescriptor::text()
                .optional()
                .with_validator(valid_size)
                .with_suppressor(enum_normalization)
                .with_description("Compute size, one of the documented size keywords."),
        )
        .with_attribute(
            "warehouse_type",
            AttributeDescriptor::text()
                .optional()
                .with_suppressor(enum_normalization)
                .with_force_new()
                .with_description("Compute family; the Service cannot convert in place."),
        )
        .with_attribute(
            "auto_suspend",
            AttributeDescriptor::integer()
                .optional()
                .with_unset_fallback(json!(600))
                .with_description("Seconds of inactivity before suspension; -1 takes the default."),
        )
        .with_attribute(
            "auto_resume",
            AttributeDescriptor::tri_state()
                .optional()
                .with_description("Resume automatically on incoming work."),
        )
        .with_attribute(
            "initially_suspended",
            AttributeDescriptor::tri_state()
                .optional()
                .with_force_new()
                .with_description("Create the warehouse suspended; only meaningful at creation."),
        )
        .with_attribute(
            "min_cluster_count",
            AttributeDescriptor::integer()
                .optional()
                .with_unset_fallback(json!(1)),
        )
        .with_attribute("max_cluster_count", AttributeDescriptor::integer().optional())
        .with_attribute(
            "resource_monitor",
            AttributeDescriptor::text()
                .optional()
                .with_suppressor(ignore_change_to_remote_value)
                .with_description("Monitor assigned to the warehouse; account-level monitors are assigned by the Service itself."),
        )
        .with_attribute("comment", AttributeDescriptor::text().optional())
        .with_attribute("state", AttributeDescriptor::text().computed())
        .with_recompute("state", ["auto_resume", "initially_suspended"]);

    Ok(ResourceDefinition {
        type_name: "borealis_warehouse",
        kind: ObjectKind::Warehouse,
        schema,
        probes: Vec::new(),
        surfaces: ReadSurfaces {
            describe: false,
            parameters: true,
        },
        migrator: Migrator::new(),
        convergence: None,
        id_from_config: warehouse_id,
    })
}
