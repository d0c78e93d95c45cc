//! The `borealis_task` resource.
//!
//! Tasks are schema-level objects running one SQL statement on a schedule.
//! The statement has no dedicated show column; it is recovered from the
//! reconstructed DDL by a text probe. Altering a running task waits for
//! the in-flight execution to finish, so create and update run under the
//! extended deadline. Resuming or suspending settles asynchronously and is
//! polled like an alert's enablement.

use serde_json::{Map, Value};

use crate::client::{ObjectKind, ShowRow};
use crate::drift::{ReadSurfaces, TextProbe};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::{AttributeDescriptor, OperationTimeouts, ResourceSchema};
use crate::suppress::statement_whitespace;
use crate::value::{eq_ignore_case, TriStateBool};

use super::{require_text, valid_object_name, ConvergenceCheck, ResourceDefinition};

fn task_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::schema(
        require_text(config, "database")?,
        require_text(config, "schema")?,
        require_text(config, "name")?,
    ))
}

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

/// Build the task resource definition.
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
                .optional()
                .with_validator(valid_object_name)
                .with_description("Warehouse the statement runs on; empty means serverless."),
        )
        .with_attribute(
            "schedule",
            AttributeDescriptor::text()
                .optional()
                .with_description("Execution schedule, a cron or interval expression."),
        )
        .with_attribute(
            "sql_statement",
            AttributeDescriptor::text()
                .required()
                .with_suppressor(statement_whitespace)
                .in_flow("definition")
                .with_description("Statement executed on each run."),
        )
        .with_attribute(
            "allow_overlapping_execution",
            AttributeDescriptor::tri_state().optional(),
        )
        .with_attribute(
            "suspend_task_after_num_failures",
            AttributeDescriptor::integer()
                .optional()
                .with_description("Consecutive failures before auto-suspension; -1 takes the default."),
        )
        .with_attribute("enabled", AttributeDescriptor::tri_state().optional())
        .with_attribute("comment", AttributeDescriptor::text().optional())
        .with_attribute("state", AttributeDescriptor::text().computed())
        .with_recompute("state", ["enabled"])
        .with_timeouts(OperationTimeouts::unbounded_execute());

    Ok(ResourceDefinition {
        type_name: "borealis_task",
        kind: ObjectKind::Task,
        schema,
        probes: vec![TextProbe::new(
            "sql_statement",
            "definition",
            r"(?is)\bAS\b\s*(.*?)\s*$",
        )?],
        surfaces: ReadSurfaces {
            describe: true,
            parameters: false,
        },
        migrator: Migrator::new(),
        convergence: Some(ConvergenceCheck {
            triggers: vec!["enabled".to_string()],
            converged: enabled_converged,
        }),
        id_from_config: task_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operation;
    use serde_json::json;
    use std::time::Duration;

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
                "schema": "JOBS",
                "name": "NIGHTLY_ROLLUP"
            })))
            .unwrap();
        assert_eq!(id, ObjectIdentifier::schema("DB", "JOBS", "NIGHTLY_ROLLUP"));
    }

    #[test]
    fn statement_probe_recovers_the_body_from_ddl() {
        let def = definition().unwrap();
        let probe = &def.probes[0];
        let ddl = "CREATE TASK NIGHTLY_ROLLUP WAREHOUSE = WH SCHEDULE = 'USING CRON 0 3 * * * UTC' \
                   AS insert into rollup select * from events";
        assert_eq!(
            probe.extract(ddl).as_deref(),
            Some("insert into rollup select * from events")
        );
    }

    #[test]
    fn create_and_update_run_under_the_extended_deadline() {
        let def = definition().unwrap();
        let timeouts = def.schema.timeouts;
        assert_eq!(
            timeouts.for_operation(Operation::Update),
            Duration::from_secs(3600)
        );
        assert_eq!(
            timeouts.for_operation(Operation::Delete),
            Duration::from_secs(1200)
        );
    }

    #[test]
    fn resume_convergence_tracks_the_state_column() {
        let started = ShowRow::new("T1").with_column("state", "started");
        let suspended = ShowRow::new("T1").with_column("state", "suspended");

        let on = config(json!({"enabled": "true"}));
        assert!(enabled_converged(&on, &started));
        assert!(!enabled_converged(&on, &suspended));

        let off = config(json!({"enabled": "false"}));
        assert!(enabled_converged(&off, &suspended));
    }
}
