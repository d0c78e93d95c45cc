//! The `borealis_resource_monitor` resource.
//!
//! Resource monitors cap warehouse credit consumption. They cannot be
//! renamed, so a name change replaces the monitor. The suspend thresholds
//! are percentages of the credit quota and use the integer unset sentinel;
//! clearing the notified-users set entirely is not expressible as an alter
//! and forces replacement.

use serde_json::{Map, Value};

use crate::client::ObjectKind;
use crate::drift::ReadSurfaces;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, ResourceSchema};
use crate::suppress::{enum_normalization, recreate_on_empty_set};
use crate::value::eq_ignore_case;

use super::{require_text, valid_object_name, ResourceDefinition};

const FREQUENCIES: &[&str] = &["MONTHLY", "DAILY", "WEEKLY", "YEARLY", "NEVER"];

fn valid_frequency(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if FREQUENCIES.iter().any(|f| eq_ignore_case(f, s)) => Ok(()),
        Some(s) => Err(format!("unknown reset frequency {s:?}")),
        None => Err("must be a string".to_string()),
    }
}

fn valid_threshold(value: &Value) -> Result<(), String> {
    match value.as_i64() {
        Some(-1) => Ok(()),
        Some(pct) if pct > 0 => Ok(()),
        Some(pct) => Err(format!("threshold must be a positive percentage, got {pct}")),
        None => Err("must be an integer".to_string()),
    }
}

fn monitor_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::account(require_text(config, "name")?))
}

/// Build the resource-monitor resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(0)
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_force_new()
                .with_description("Monitor name; monitors cannot be renamed."),
        )
        .with_attribute(
            "credit_quota",
            AttributeDescriptor::integer()
                .optional()
                .with_validator(valid_threshold)
                .with_description("Credits allowed per frequency window; -1 leaves it uncapped."),
        )
        .with_attribute(
            "frequency",
            AttributeDescriptor::text()
                .optional()
                .with_validator(valid_frequency)
                .with_suppressor(enum_normalization)
                .with_description("When the used-credit counter resets."),
        )
        .with_attribute(
            "start_timestamp",
            AttributeDescriptor::text()
                .optional()
                .with_description("When monitoring starts; IMMEDIATELY or a timestamp."),
        )
        .with_attribute("end_timestamp", AttributeDescriptor::text().optional())
        .with_attribute(
            "notify_users",
            AttributeDescriptor::text_set()
                .optional()
                .with_recreate_if(recreate_on_empty_set)
                .with_description("Users notified when a threshold fires, unordered."),
        )
        .with_attribute(
            "suspend_trigger",
            AttributeDescriptor::integer()
                .optional()
                .with_validator(valid_threshold)
                .with_description("Quota percentage that suspends warehouses after running work."),
        )
        .with_attribute(
            "suspend_immediate_trigger",
            AttributeDescriptor::integer()
                .optional()
                .with_validator(valid_threshold)
                .with_description("Quota percentage that cancels running work and suspends."),
        );

    Ok(ResourceDefinition {
        type_name: "borealis_resource_monitor",
        kind: ObjectKind::ResourceMonitor,
        schema,
        probes: Vec::new(),
        surfaces: ReadSurfaces::default(),
        migrator: Migrator::new(),
        convergence: None,
        id_from_config: monitor_id,
    })
}
