//! End-to-end dispatcher behavior against the in-memory fake Service.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use borealis_provider::client::{ObjectKind, ShowRow};
use borealis_provider::drift::ReadSurfaces;
use borealis_provider::error::ServiceError;
use borealis_provider::ident::ObjectIdentifier;
use borealis_provider::lifecycle::Dispatcher;
use borealis_provider::migrate::Migrator;
use borealis_provider::resources::{ResourceDefinition, ResourceRegistry};
use borealis_provider::schema::{AttributeDescriptor, ResourceSchema};
use borealis_provider::state::StateRecord;
use borealis_provider::testing::{FakeObject, FakeService, ResourceTester};

fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => panic!("expected an object"),
    }
}

fn warehouse_raw(attributes: Value) -> borealis_provider::state::RawState {
    let attributes = obj(attributes);
    let name = attributes
        .get("name")
        .and_then(Value::as_str)
        .unwrap()
        .to_string();
    let mut record = StateRecord::new(ObjectIdentifier::account(name), "borealis_warehouse", 1);
    record.attributes = attributes;
    record.to_raw().unwrap()
}

fn seed_warehouse(tester: &ResourceTester, name: &str, columns: &[(&str, &str)]) {
    let mut row = ShowRow::new(name);
    for (column, value) in columns {
        row = row.with_column(*column, *value);
    }
    tester.service().seed(
        ObjectKind::Warehouse,
        &ObjectIdentifier::account(name),
        FakeObject {
            row,
            ..FakeObject::default()
        },
    );
}

#[tokio::test(start_paused = true)]
async fn import_parses_the_quoted_identifier_and_writes_the_pipe_encoding() {
    let tester = ResourceTester::new().unwrap();
    let id = ObjectIdentifier::schema_object_with_arguments(
        "A",
        "B",
        "C",
        vec!["VARCHAR".to_string(), "NUMBER".to_string()],
    );
    tester.service().seed(
        ObjectKind::Function,
        &id,
        FakeObject {
            row: ShowRow::new("C"),
            ..FakeObject::default()
        },
    );

    let response = tester
        .dispatcher()
        .import("borealis_function", "\"A\".\"B\".\"C\"(VARCHAR,NUMBER)")
        .await
        .unwrap();
    let state = response.state.unwrap();
    assert_eq!(state.id, id);
    assert_eq!(state.id.to_state_encoding(), "A|B|C|(VARCHAR,NUMBER)");
    assert_eq!(
        state.id.arguments().unwrap(),
        ["VARCHAR".to_string(), "NUMBER".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn import_of_a_missing_object_is_not_found() {
    let tester = ResourceTester::new().unwrap();
    let err = tester
        .dispatcher()
        .import("borealis_function", "GONE")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn create_omits_defaults_and_adopts_the_service_choice_on_read() {
    let tester = ResourceTester::new().unwrap();
    // The post-create read sees the value the Service assigned itself.
    tester.service().script_show(
        ObjectKind::Warehouse,
        vec![ShowRow::new("WH2").with_column("auto_resume", "true")],
    );

    let response = tester
        .dispatcher()
        .create(
            "borealis_warehouse",
            obj(json!({"name": "WH2", "auto_resume": "default", "comment": ""})),
        )
        .await
        .unwrap();

    let stored = tester
        .service()
        .object(ObjectKind::Warehouse, &ObjectIdentifier::account("WH2"))
        .unwrap();
    assert_eq!(stored.row.get("auto_resume"), None);
    assert_eq!(stored.row.get("comment"), None);

    let state = response.state.unwrap();
    assert_eq!(state.attribute("auto_resume"), Some(&json!("true")));
    assert_eq!(state.attribute("comment"), Some(&json!("")));
}

#[tokio::test(start_paused = true)]
async fn create_rereads_the_remote_into_state() {
    let tester = ResourceTester::new().unwrap();
    let response = tester
        .dispatcher()
        .create(
            "borealis_warehouse",
            obj(json!({"name": "WH1", "comment": "loader"})),
        )
        .await
        .unwrap();

    let state = response.state.unwrap();
    assert!(state.show_snapshot.is_some());
    assert_eq!(state.schema_version, 1);
    assert!(tester.service().call_count("show_objects") >= 1);
}

#[tokio::test(start_paused = true)]
async fn clearing_a_comment_issues_a_single_unset_alter() {
    let tester = ResourceTester::new().unwrap();
    seed_warehouse(&tester, "WH1", &[("comment", "old")]);
    tester.service().clear_calls();

    let response = tester
        .dispatcher()
        .update(
            "borealis_warehouse",
            warehouse_raw(json!({"name": "WH1", "comment": "old"})),
            obj(json!({"name": "WH1", "comment": ""})),
        )
        .await
        .unwrap();

    assert_eq!(tester.service().call_count("alter_object"), 1);
    let stored = tester
        .service()
        .object(ObjectKind::Warehouse, &ObjectIdentifier::account("WH1"))
        .unwrap();
    assert_eq!(stored.row.get("comment"), None);
    assert_eq!(
        response.state.unwrap().attribute("comment"),
        Some(&json!(""))
    );
}

#[tokio::test(start_paused = true)]
async fn suppressed_whitespace_change_issues_zero_remote_calls() {
    let tester = ResourceTester::new().unwrap();
    let id = ObjectIdentifier::schema("DB", "MON", "A1");
    tester.service().seed(
        ObjectKind::Alert,
        &id,
        FakeObject {
            row: ShowRow::new("A1"),
            ..FakeObject::default()
        },
    );
    tester.service().clear_calls();

    let base = json!({
        "database": "DB",
        "schema": "MON",
        "name": "A1",
        "warehouse": "WH",
        "schedule": "60 MINUTE",
        "condition": "select 1",
        "action": "call notify()"
    });
    let mut record = StateRecord::new(id, "borealis_alert", 0);
    record.attributes = obj(base.clone());
    let mut config = obj(base);
    config.insert("condition".to_string(), json!("select   1"));

    let response = tester
        .dispatcher()
        .update("borealis_alert", record.to_raw().unwrap(), config)
        .await
        .unwrap();

    assert!(tester.service().calls().is_empty());
    assert!(!response.has_errors());
    // The user's spelling wins when the diff is suppressed.
    assert_eq!(
        response.state.unwrap().attribute("condition"),
        Some(&json!("select   1"))
    );
}

#[tokio::test(start_paused = true)]
async fn read_of_a_vanished_object_clears_state_with_a_warning() {
    let tester = ResourceTester::new().unwrap();
    let response = tester
        .dispatcher()
        .read(
            "borealis_warehouse",
            warehouse_raw(json!({"name": "GHOST"})),
        )
        .await
        .unwrap();
    assert!(response.state.is_none());
    assert_eq!(response.diagnostics.len(), 1);
    assert!(!response.diagnostics[0].is_error());
}

#[tokio::test(start_paused = true)]
async fn suspending_an_alert_polls_until_the_state_settles() {
    let tester = ResourceTester::new().unwrap();
    let id = ObjectIdentifier::schema("DB", "MON", "A1");
    tester.service().seed(
        ObjectKind::Alert,
        &id,
        FakeObject {
            row: ShowRow::new("A1").with_column("state", "started"),
            ..FakeObject::default()
        },
    );
    for state in ["suspending", "suspending", "suspended"] {
        tester.service().script_show(
            ObjectKind::Alert,
            vec![ShowRow::new("A1").with_column("state", state)],
        );
    }
    tester.service().clear_calls();

    let base = json!({
        "database": "DB",
        "schema": "MON",
        "name": "A1",
        "warehouse": "WH",
        "schedule": "60 MINUTE",
        "condition": "select 1",
        "action": "call notify()",
        "enabled": "true"
    });
    let mut record = StateRecord::new(id, "borealis_alert", 0);
    record.attributes = obj(base.clone());
    let mut config = obj(base);
    config.insert("enabled".to_string(), json!("false"));

    let response = tester
        .dispatcher()
        .update("borealis_alert", record.to_raw().unwrap(), config)
        .await
        .unwrap();

    assert!(!response.has_errors());
    // No "still settling" warning: convergence happened within the bound.
    assert!(response.diagnostics.is_empty());
    // Three poll probes before the final re-read.
    assert!(tester.service().call_count("show_objects") >= 4);
}

#[tokio::test(start_paused = true)]
async fn poll_exhaustion_surfaces_a_warning_not_an_error() {
    let tester = ResourceTester::new().unwrap();
    let id = ObjectIdentifier::schema("DB", "MON", "A1");
    tester.service().seed(
        ObjectKind::Alert,
        &id,
        FakeObject {
            row: ShowRow::new("A1").with_column("state", "started"),
            ..FakeObject::default()
        },
    );
    for _ in 0..5 {
        tester.service().script_show(
            ObjectKind::Alert,
            vec![ShowRow::new("A1").with_column("state", "suspending")],
        );
    }

    let base = json!({
        "database": "DB",
        "schema": "MON",
        "name": "A1",
        "warehouse": "WH",
        "schedule": "60 MINUTE",
        "condition": "select 1",
        "action": "call notify()",
        "enabled": "true"
    });
    let mut record = StateRecord::new(id, "borealis_alert", 0);
    record.attributes = obj(base.clone());
    let mut config = obj(base);
    config.insert("enabled".to_string(), json!("false"));

    let response = tester
        .dispatcher()
        .update("borealis_alert", record.to_raw().unwrap(), config)
        .await
        .unwrap();

    assert!(!response.has_errors());
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.summary.contains("settling")));
}

#[tokio::test(start_paused = true)]
async fn legacy_function_state_upgrades_before_the_read() {
    let tester = ResourceTester::new().unwrap();
    let id = ObjectIdentifier::schema_object_with_arguments("DB", "SCH", "FN", Vec::new());
    tester.service().seed(
        ObjectKind::Function,
        &id,
        FakeObject {
            row: ShowRow::new("FN"),
            ..FakeObject::default()
        },
    );

    let mut raw = borealis_provider::state::RawState::new();
    raw.insert("id".to_string(), json!("DB.SCH.FN"));
    raw.insert("kind".to_string(), json!("borealis_function"));
    raw.insert("attributes".to_string(), json!({"name": "FN"}));
    raw.insert("schema_version".to_string(), json!(0));

    let response = tester
        .dispatcher()
        .read("borealis_function", raw)
        .await
        .unwrap();
    let state = response.state.unwrap();
    assert_eq!(state.id.to_state_encoding(), "DB|SCH|FN|()");
    assert_eq!(state.id.arguments().unwrap().len(), 0);
    assert_eq!(state.schema_version, 2);
}

#[tokio::test(start_paused = true)]
async fn function_create_carries_the_signature_into_state() {
    let tester = ResourceTester::new().unwrap();
    let config = json!({
        "database": "DB",
        "schema": "UTIL",
        "name": "PARSE_TS",
        "arguments": ["VARCHAR", "NUMBER"],
        "return_type": "TIMESTAMP",
        "body": "select try_to_timestamp(a)"
    });

    let response = tester
        .dispatcher()
        .create("borealis_function", obj(config.clone()))
        .await
        .unwrap();
    assert!(!response.has_errors());
    let state = response.state.unwrap();
    assert_eq!(state.id.to_state_encoding(), "DB|UTIL|PARSE_TS|(VARCHAR,NUMBER)");

    // Re-applying the same configuration is a no-op.
    tester.service().clear_calls();
    tester
        .dispatcher()
        .update("borealis_function", state.to_raw().unwrap(), obj(config))
        .await
        .unwrap();
    assert!(tester.service().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn identical_config_issues_zero_remote_calls() {
    let tester = ResourceTester::new().unwrap();
    seed_warehouse(&tester, "WH1", &[("comment", "x")]);
    tester.service().clear_calls();

    let attrs = json!({"name": "WH1", "comment": "x", "auto_suspend": 300});
    tester
        .dispatcher()
        .update(
            "borealis_warehouse",
            warehouse_raw(attrs.clone()),
            obj(attrs),
        )
        .await
        .unwrap();
    assert!(tester.service().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_of_a_missing_object_succeeds() {
    let tester = ResourceTester::new().unwrap();
    let response = tester
        .dispatcher()
        .delete("borealis_warehouse", warehouse_raw(json!({"name": "GONE"})))
        .await
        .unwrap();
    assert!(response.state.is_none());
    assert!(!response.has_errors());

    // Also when the Service reports the miss explicitly.
    tester
        .service()
        .fail_next(ServiceError::NotFound("GONE".to_string()));
    assert!(tester
        .dispatcher()
        .delete("borealis_warehouse", warehouse_raw(json!({"name": "GONE"})))
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn force_new_changes_refuse_in_place_update() {
    let tester = ResourceTester::new().unwrap();
    seed_warehouse(&tester, "WH1", &[("warehouse_type", "STANDARD")]);
    tester.service().clear_calls();

    let prior = json!({"name": "WH1", "warehouse_type": "STANDARD"});
    let config = obj(json!({"name": "WH1", "warehouse_type": "SNOWPARK"}));

    let plan = tester
        .dispatcher()
        .plan("borealis_warehouse", warehouse_raw(prior.clone()), &config)
        .await
        .unwrap();
    assert!(plan.requires_replace);

    let err = tester
        .dispatcher()
        .update("borealis_warehouse", warehouse_raw(prior), config)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
    assert_eq!(tester.service().call_count("alter_object"), 0);
}

#[tokio::test(start_paused = true)]
async fn rename_is_issued_before_other_alters() {
    let tester = ResourceTester::new().unwrap();
    seed_warehouse(&tester, "OLD", &[("comment", "a")]);
    tester.service().clear_calls();

    let response = tester
        .dispatcher()
        .update(
            "borealis_warehouse",
            warehouse_raw(json!({"name": "OLD", "comment": "a"})),
            obj(json!({"name": "NEW", "comment": "b"})),
        )
        .await
        .unwrap();

    let alters: Vec<String> = tester
        .service()
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("alter_object"))
        .collect();
    assert_eq!(alters.len(), 2);
    // The first alter addresses the old name, the second the new one.
    assert!(alters[0].contains("OLD"));
    assert!(alters[1].contains("NEW"));

    let new_id = ObjectIdentifier::account("NEW");
    assert!(tester.service().contains(ObjectKind::Warehouse, &new_id));
    assert!(!tester
        .service()
        .contains(ObjectKind::Warehouse, &ObjectIdentifier::account("OLD")));
    assert_eq!(response.state.unwrap().id, new_id);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let tester = ResourceTester::new().unwrap();
    tester
        .service()
        .fail_next(ServiceError::Transient("throttled".to_string()));

    let response = tester
        .dispatcher()
        .create("borealis_warehouse", obj(json!({"name": "WH1"})))
        .await
        .unwrap();
    assert!(response.state.is_some());
    assert_eq!(tester.service().call_count("create_object"), 2);
}

#[tokio::test(start_paused = true)]
async fn validation_errors_short_circuit_before_any_remote_call() {
    let tester = ResourceTester::new().unwrap();
    let response = tester
        .dispatcher()
        .create(
            "borealis_warehouse",
            obj(json!({"name": "WH1", "warehouse_size": "GIGANTIC"})),
        )
        .await
        .unwrap();
    assert!(response.has_errors());
    assert!(response.state.is_none());
    assert!(tester.service().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn preview_resources_are_gated_behind_the_allow_list() {
    fn preview_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
        config
            .get("name")
            .and_then(Value::as_str)
            .map(ObjectIdentifier::account)
            .ok_or_else(|| ServiceError::InvalidArgument("missing name".to_string()))
    }
    let registry = ResourceRegistry::new().register(ResourceDefinition {
        type_name: "borealis_experimental",
        kind: ObjectKind::Connection,
        schema: ResourceSchema::v(0)
            .with_attribute("name", AttributeDescriptor::text().required())
            .preview(),
        probes: Vec::new(),
        surfaces: ReadSurfaces::default(),
        migrator: Migrator::new(),
        convergence: None,
        id_from_config: preview_id,
    });

    let service = Arc::new(FakeService::new());
    let gated = Dispatcher::new(Arc::clone(&service), registry.clone());
    let err = gated
        .create("borealis_experimental", obj(json!({"name": "X"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
    assert!(service.calls().is_empty());

    let enabled = Dispatcher::new(Arc::clone(&service), registry)
        .with_preview_enabled("borealis_experimental");
    let response = enabled
        .create("borealis_experimental", obj(json!({"name": "X"})))
        .await
        .unwrap();
    assert!(response.state.is_some());
}
