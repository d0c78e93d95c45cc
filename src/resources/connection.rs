//! The `borealis_connection` resource.
//!
//! Connections are account-level failover endpoints. The failover account
//! list is an unordered set; clearing it entirely is not expressible as an
//! alter and forces replacement. Promoting a connection to primary settles
//! asynchronously, so `is_primary` updates poll the show listing until the
//! promotion is visible.
//!
//! Records written before the account-rename cleanup still carry the old
//! account locator; the v0 upgrader rewrites them from the live session.

use serde_json::{Map, Value};

use crate::client::{ObjectKind, ShowRow};
use crate::drift::ReadSurfaces;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::{rewrite_account_identifier, Migrator};
use crate::schema::{AttributeDescriptor, ResourceSchema};
use crate::suppress::recreate_on_empty_set;
use crate::value::TriStateBool;

use super::{require_text, valid_object_name, ConvergenceCheck, ResourceDefinition};

fn connection_id(config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
    Ok(ObjectIdentifier::account(require_text(config, "name")?))
}

fn primary_converged(config: &Map<String, Value>, row: &ShowRow) -> bool {
    let reported = row
        .get("is_primary")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    match TriStateBool::from_attribute(config.get("is_primary")) {
        Ok(tri) => tri.explicit().map(|want| want == reported).unwrap_or(true),
        Err(_) => false,
    }
}

/// Build the connection resource definition.
pub fn definition() -> Result<ResourceDefinition, ServiceError> {
    let schema = ResourceSchema::v(1)
        .with_attribute(
            "name",
            AttributeDescriptor::text()
                .required()
                .with_validator(valid_object_name)
                .with_force_new()
                .with_description("Connection name; connections cannot be renamed."),
        )
        .with_attribute(
            "enable_failover_to_accounts",
            AttributeDescriptor::text_set()
                .optional()
                .with_recreate_if(recreate_on_empty_set)
                .with_description("Accounts the connection may fail over to, unordered."),
        )
        .with_attribute(
            "is_primary",
            AttributeDescriptor::tri_state()
                .optional()
                .with_description("Promote this connection to primary."),
        )
        .with_attribute("comment", AttributeDescriptor::text().optional())
        .with_attribute("primary_locator", AttributeDescriptor::text().computed())
        .with_recompute("primary_locator", ["is_primary"]);

    Ok(ResourceDefinition {
        type_name: "borealis_connection",
        kind: ObjectKind::Connection,
        schema,
        probes: Vec::new(),
        surfaces: ReadSurfaces::default(),
        migrator: Migrator::new().with_session_upgrader(0, rewrite_account_identifier),
        convergence: Some(ConvergenceCheck {
            triggers: vec!["is_primary".to_string()],
            converged: primary_converged,
        }),
        id_from_config: connection_id,
    })
}
