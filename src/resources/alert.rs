//! The `borealis_alert` resource.
//!
//! Alerts are schema-level objects with three statement-valued fields: the
//! schedule, the condition, and the action. The condition and action have
//! no dedicated show column; they are recovered from the reconstructed DDL
//! by text probes. Suspending or resuming an alert settles asynchronously,
//! so updates to `enabled` poll the show state column until it reports the
//! target state.

use serde_json::{Map, Value};

use crate::client::{ObjectKind, ShowRow};
use crate::drift::{ReadSurfaces, TextProbe};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, ResourceSchema};
use crate::suppress::statement_whitespace;
use crate::value::{eq_ignore_case, TriStateBool};

use super::{require_text, valid_object_name, ConvergenceCheck, ResourceDefinition};

fn alert_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::schema(
        require_text(config, "database")?,
        require_text(config, "schema")?,
        require_text(config, "name")?,
    ))
}

// The show state column reports "started" for enabled alerts and
// "suspended" otherwise; a declared default accepts either.
fn enabled_converged(config: &Map<String, Value>, row: &ShowRow) -> bool {
    let Some(state) = row.get("state") else {
        return false;
    };
    match TriStateBool::from_attribute(config.get("enabled")) {
        Ok(TriStateBool::True) => eq_ignore_case(state, "started"),
        Ok(TriStateBool::False) => eq_ignore_case(state, "suspended"),
        Ok(TriStateBool::Default) => true,
        Err(_) => false,
    }
}

/// Build the alert resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(0)
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
            "warehouse",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_description("Warehouse the condition and action run on."),
        )
        .with_attribute(
            "schedule",
            AttributeDescriptor::text()
                .required()
                .with_description("Evaluation schedule, a cron or interval expression."),
        )
        .with_attribute(
            "condition",
            AttributeDescriptor::text()
                .required()
                .with_suppressor(statement_whitespace)
                .in_flow("definition")
                .with_description("Statement whose non-empty result fires the alert."),
        )
        .with_attribute(
            "action",
            AttributeDescriptor::text()
                .required()
                .with_suppressor(statement_whitespace)
                .in_flow("definition")
                .with_description("Statement executed when the condition fires."),
        )
        .with_attribute("enabled", AttributeDescriptor::tri_state().optional())
        .with_attribute("comment", AttributeDescriptor::text().optional())
        .with_attribute("state", AttributeDescriptor::text().computed())
        .with_recompute("state", ["enabled"]);

    Ok(ResourceDefinition {
        type_name: "borealis_alert",
        kind: ObjectKind::Alert,
        schema,
        probes: vec![
            TextProbe::new(
                "condition",
                "definition",
                r"(?is)\bIF\s*\(\s*EXISTS\s*\((.*?)\)\s*\)\s*THEN\b",
            )?,
            TextProbe::new("action", "definition", r"(?is)\bTHEN\b\s*(.*?)\s*$")?,
        ],
        surfaces: ReadSurfaces {
            describe: true,
            parameters: false,
        },
        migrator: Migrator::new(),
        convergence: Some(ConvergenceCheck {
            triggers: vec!["enabled".to_string()],
            converged: enabled_converged,
        }),
        id_from_config: alert_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn id_is_schema_qualified() {
        let def = definition().unwrap();
        let id = def
            .id_for(&config(json!({
                "database": "DB",
                "schema": "MONITORING",
                "name": "STALE_DATA"
            })))
            .unwrap();
        assert_eq!(id, ObjectIdentifier::schema("DB", "MONITORING", "STALE_DATA"));
        assert!(def.id_for(&config(json!({"name": "STALE_DATA"}))).is_err());
    }

    #[test]
    fn condition_probe_recovers_the_statement_from_ddl() {
        let def = definition().unwrap();
        let probe = def.probes.iter().find(|p| p.attribute == "condition").unwrap();
        let ddl = "CREATE ALERT A1 WAREHOUSE = WH SCHEDULE = '60 MINUTE' \
                   IF (EXISTS (select 1 from t where stale)) \
                   THEN call notify('stale')";
        assert_eq!(
            probe.extract(ddl).as_deref(),
            Some("select 1 from t where stale")
        );

        let action = def.probes.iter().find(|p| p.attribute == "action").unwrap();
        assert_eq!(action.extract(ddl).as_deref(), Some("call notify('stale')"));
    }

    #[test]
    fn enabled_convergence_tracks_the_state_column() {
        let started = ShowRow::new("A1").with_column("state", "started");
        let suspended = ShowRow::new("A1").with_column("state", "SUSPENDED");

        let on = config(json!({"enabled": "true"}));
        assert!(enabled_converged(&on, &started));
        assert!(!enabled_converged(&on, &suspended));

        let off = config(json!({"enabled": "false"}));
        assert!(enabled_converged(&off, &suspended));
        assert!(!enabled_converged(&off, &started));

        // A declared default accepts whatever the Service settled on.
        let default = config(json!({}));
        assert!(enabled_converged(&default, &started));
        assert!(enabled_converged(&default, &suspended));
    }

    #[test]
    fn container_moves_force_replacement() {
        let def = definition().unwrap();
        assert!(def.schema.attribute("database").unwrap().force_new);
        assert!(def.schema.attribute("schema").unwrap().force_new);
        assert!(def.schema.attribute("name").unwrap().renames_object);
    }
}
