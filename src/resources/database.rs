//! The `borealis_database` resource.
//!
//! Databases are account-level containers. Retention tunables surface as
//! object parameters, so Reads compose the parameter listing. The Service
//! has no UNSET for the retention window; the documented default of one
//! day is SET instead. Transience is fixed at creation.

use serde_json::{json, Map, Value};

use crate::client::ObjectKind;
use crate::drift::ReadSurfaces;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, ResourceSchema};

use super::{require_text, valid_object_name, ResourceDefinition};

fn valid_retention_days(value: &Value) -> Result<(), String> {
    match value.as_i64() {
        Some(-1) => Ok(()),
        Some(days) if (0..=90).contains(&days) => Ok(()),
        Some(days) => Err(format!("retention must be between 0 and 90 days, got {days}")),
        None => Err("must be an integer".to_string()),
    }
}

fn database_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::account(require_text(config, "name")?))
}

/// Build the database resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(0)
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .renaming()
                .with_validator(valid_object_name)
                .with_description("Database name; changing it renames the object in place."),
        )
        .with_attribute(
            "data_retention_time_in_days",
            AttributeDescriptor::integer()
                .optional()
                .with_validator(valid_retention_days)
                .with_unset_fallback(json!(1))
                .with_description("Time-travel window in days; -1 takes the default."),
        )
        .with_attribute(
            "max_data_extension_time_in_days",
            AttributeDescriptor::integer()
                .optional()
                .with_validator(valid_retention_days),
        )
        .with_attribute(
            "is_transient",
            AttributeDescriptor::tri_state()
                .optional()
                .with_force_new()
                .with_description("Transient databases skip fail-safe; fixed at creation."),
        )
        .with_attribute("comment", AttributeDescriptor::text().optional());

    Ok(ResourceDefinition {
        type_name: "borealis_database",
        kind: ObjectKind::Database,
        schema,
        probes: Vec::new(),
        surfaces: ReadSurfaces {
            describe: false,
            parameters: true,
        },
        migrator: Migrator::new(),
        convergence: None,
        id_from_config: database_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn id_comes_from_the_name_field() {
        let def = definition().unwrap();
        let id = def.id_for(&config(json!({"name": "ANALYTICS"}))).unwrap();
        assert_eq!(id, ObjectIdentifier::account("ANALYTICS"));
    }

    #[test]
    fn retention_accepts_the_sentinel_and_the_documented_range() {
        assert!(valid_retention_days(&json!(-1)).is_ok());
        assert!(valid_retention_days(&json!(0)).is_ok());
        assert!(valid_retention_days(&json!(90)).is_ok());
        assert!(valid_retention_days(&json!(91)).is_err());
        assert!(valid_retention_days(&json!("7")).is_err());
    }

    #[test]
    fn transience_is_fixed_at_creation() {
        let def = definition().unwrap();
        assert!(def.schema.attribute("is_transient").unwrap().force_new);
        assert!(!def
            .schema
            .attribute("data_retention_time_in_days")
            .unwrap()
            .force_new);
    }

    #[test]
    fn retention_falls_back_to_one_day() {
        let def = definition().unwrap();
        let retention = def.schema.attribute("data_retention_time_in_days").unwrap();
        assert_eq!(retention.unset_fallback, Some(json!(1)));
        assert!(retention.is_unset(Some(&json!(-1))));
    }
}
