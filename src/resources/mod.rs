//! Resource definitions.
//!
//! A [`ResourceDefinition`] binds one resource type name to everything the
//! dispatcher needs: the object kind, the attribute schema, the extra read
//! surfaces, the text probes, the state migrator, the optional convergence
//! check polled after updates, and how to derive the object identifier
//! from configuration.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::client::{ObjectKind, ShowRow};
use crate::drift::{ReadSurfaces, TextProbe};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::Migrator;
use crate::schema::ResourceSchema;

pub mod alert;
pub mod connection;
pub mod database;
pub mod function;
pub mod resource_monitor;
pub mod schema_container;
pub mod task;
pub mod warehouse;

/// Derives the object identifier from the declared configuration.
pub type IdFromConfigFn = fn(&Map<String, Value>) -> Result<ObjectIdentifier, ServiceError>;

/// Whether a fresh show row matches the desired configuration. Polled
/// after updates for objects whose transitions settle asynchronously.
pub type ConvergenceFn = fn(&Map<String, Value>, &ShowRow) -> bool;

/// An asynchronous-transition check: polled only when one of its trigger
/// attributes was part of the plan.
#[derive(Debug, Clone)]
pub struct ConvergenceCheck {
    /// The attributes whose change starts the poll.
    pub triggers: Vec<String>,
    /// The settled-state predicate.
    pub converged: ConvergenceFn,
}

impl ConvergenceCheck {
    /// Whether any changed attribute triggers this check. Record leaves
    /// match the trigger of the attribute they belong to.
    pub fn applies(&self, changed: &[String]) -> bool {
        self.triggers
            .iter()
            .any(|t| changed.iter().any(|c| crate::schema::trigger_matches(t, c)))
    }
}

/// Everything the dispatcher knows about one resource type.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    /// The resource type name, e.g. `borealis_warehouse`.
    pub type_name: &'static str,
    /// The remote object kind.
    pub kind: ObjectKind,
    /// The attribute contract.
    pub schema: ResourceSchema,
    /// Probes recovering attributes from larger remote text fields.
    pub probes: Vec<TextProbe>,
    /// Which remote surfaces a Read composes beyond the show listing.
    pub surfaces: ReadSurfaces,
    /// State upgraders for records written at older schema versions.
    pub migrator: Migrator,
    /// Post-update convergence check, if transitions settle asynchronously.
    pub convergence: Option<ConvergenceCheck>,
    /// Identifier derivation from configuration.
    pub id_from_config: IdFromConfigFn,
}

impl ResourceDefinition {
    /// Derive the object identifier for a configuration.
    pub fn id_for(&self, config: &Map<String, Value>) -> Result<ObjectIdentifier, ServiceError> {
        (self.id_from_config)(config)
    }
}

/// All registered resource definitions, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    definitions: BTreeMap<&'static str, ResourceDefinition>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one of the same name.
    pub fn register(mut self, definition: ResourceDefinition) -> Self {
        self.definitions.insert(definition.type_name, definition);
        self
    }

    /// Look up a definition by type name.
    pub fn get(&self, type_name: &str) -> Option<&ResourceDefinition> {
        self.definitions.get(type_name)
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.definitions.keys().copied().collect()
    }
}

/// The registry of every built-in resource.
pub fn default_registry() -> Result<ResourceRegistry, ServiceError> {
    Ok(ResourceRegistry::new()
        .register(warehouse::definition()?)
        .register(alert::definition()?)
        .register(connection::definition()?)
        .register(database::definition()?)
        .register(function::definition()?)
        .register(resource_monitor::definition()?)
        .register(schema_container::definition()?)
        .register(task::definition()?))
}

/// Read a required text field out of a configuration map.
pub(crate) fn require_text(
    config: &Map<String, Value>,
    key: &str,
) -> Result<String, ServiceError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ServiceError::InvalidArgument(format!("configuration is missing required field {key:?}"))
        })
}

/// Validator shared by object-name attributes: a bare or quoted single
/// name part, never a qualified path.
pub(crate) fn valid_object_name(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if s.is_empty() => Err("must not be empty".to_string()),
        Some(s) if s.contains('.') || s.contains('|') => {
            Err("must be a single unqualified name".to_string())
        }
        Some(_) => Ok(()),
        None => Err("must be a string".to_string()),
    }
}
