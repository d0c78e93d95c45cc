//! The Service client seam.
//!
//! The core never renders SQL. It builds typed request objects and hands
//! them to a [`ServiceClient`] implementation, which owns transport,
//! authentication, and the SQL text of each DDL command. Remote reads come
//! back as [`ShowRow`] listings and [`crate::value::Property`] bags.
//!
//! Every call receives a [`CallContext`] carrying the host's cancellation
//! token and the usage-tracking marker the dispatcher attached; clients
//! append the rendered marker to outgoing SQL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::schema::Operation;
use crate::value::Property;

/// The remote object kind a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    /// A virtual warehouse.
    Warehouse,
    /// A scheduled alert.
    Alert,
    /// A cross-account connection.
    Connection,
    /// A user-defined function.
    Function,
    /// A database.
    Database,
    /// A schema within a database.
    Schema,
    /// A credit-quota resource monitor.
    ResourceMonitor,
    /// A scheduled task.
    Task,
}

impl ObjectKind {
    /// The DDL keyword for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warehouse => "WAREHOUSE",
            Self::Alert => "ALERT",
            Self::Connection => "CONNECTION",
            Self::Function => "FUNCTION",
            Self::Database => "DATABASE",
            Self::Schema => "SCHEMA",
            Self::ResourceMonitor => "RESOURCE MONITOR",
            Self::Task => "TASK",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured usage marker appended to every outgoing SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingMarker {
    /// Provider version issuing the call.
    pub version: String,
    /// Resource type name being reconciled.
    pub resource: String,
    /// Lifecycle operation in progress.
    pub operation: Operation,
}

impl TrackingMarker {
    /// Build a marker for one dispatched operation.
    pub fn new(version: impl Into<String>, resource: impl Into<String>, operation: Operation) -> Self {
        Self {
            version: version.into(),
            resource: resource.into(),
            operation,
        }
    }

    /// Render the marker as the SQL comment suffix clients append.
    pub fn render(&self) -> String {
        format!(
            "--!borealis-provider {}",
            serde_json::json!({
                "version": self.version,
                "resource": self.resource,
                "operation": self.operation.as_str(),
            })
        )
    }
}

/// Per-call context: cancellation plus the usage-tracking marker.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Cancellation signal from the host; propagated into every remote call.
    pub cancel: CancellationToken,
    /// Tracking marker for this operation, if dispatched.
    pub tracking: Option<TrackingMarker>,
}

impl CallContext {
    /// A context with a fresh, never-cancelled token. Useful in tests.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Wrap a host cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tracking: None,
        }
    }

    /// Attach a tracking marker.
    pub fn with_tracking(mut self, marker: TrackingMarker) -> Self {
        self.tracking = Some(marker);
        self
    }

    /// The rendered tracking comment, if a marker is attached.
    pub fn tracking_comment(&self) -> Option<String> {
        self.tracking.as_ref().map(TrackingMarker::render)
    }
}

/// One row of a show listing. `name` is always present; the remaining
/// columns vary per object kind and are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRow {
    /// Object name.
    pub name: String,
    /// Remaining columns, keyed by lower-case column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, String>,
}

impl ShowRow {
    /// A row with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: BTreeMap::new(),
        }
    }

    /// Add a column value.
    pub fn with_column(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.insert(column.into().to_lowercase(), value.into());
        self
    }

    /// Read a column value. Empty text reads as `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(&column.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Filter for a show listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowFilter {
    /// Restrict to names matching this pattern (exact name in practice).
    pub like: Option<String>,
    /// Restrict to objects under this container identifier.
    pub scope: Option<ObjectIdentifier>,
}

impl ShowFilter {
    /// Filter for exactly one object.
    pub fn by_id(id: &ObjectIdentifier) -> Self {
        let scope = match id {
            ObjectIdentifier::Account { .. } => None,
            ObjectIdentifier::Database { database, .. } => {
                Some(ObjectIdentifier::account(database.clone()))
            }
            ObjectIdentifier::Schema {
                database, schema, ..
            }
            | ObjectIdentifier::SchemaObjectWithArguments {
                database, schema, ..
            } => Some(ObjectIdentifier::database(database.clone(), schema.clone())),
        };
        Self {
            like: Some(id.name().to_string()),
            scope,
        }
    }
}

/// A typed create request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    /// Object kind.
    pub kind: ObjectKind,
    /// Target identifier.
    pub id: ObjectIdentifier,
    /// Declared fields to render into the create statement.
    pub fields: BTreeMap<String, Value>,
}

/// A typed alter request: one SET bag, one UNSET bag, optional rename.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlterRequest {
    /// Fields to assign.
    pub set: BTreeMap<String, Value>,
    /// Fields to revert to their Service default.
    pub unset: Vec<String>,
    /// Rename target; when present the client issues the rename only.
    pub rename_to: Option<ObjectIdentifier>,
}

impl AlterRequest {
    /// Whether the request would render to nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.rename_to.is_none()
    }

    /// A pure rename request.
    pub fn rename(to: ObjectIdentifier) -> Self {
        Self {
            rename_to: Some(to),
            ..Self::default()
        }
    }
}

/// A typed drop request.
#[derive(Debug, Clone, PartialEq)]
pub struct DropRequest {
    /// Object kind.
    pub kind: ObjectKind,
    /// Target identifier.
    pub id: ObjectIdentifier,
    /// Succeed when the object is already gone.
    pub if_exists: bool,
}

/// The session identity used by the legacy account-rename migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Organization name.
    pub organization: String,
    /// Account name within the organization.
    pub account: String,
}

/// The interface the core consumes to talk to the Service. Implementations
/// own SQL rendering, transport, and session management; they are shared
/// read-only handles and must be safe to call from concurrent lifecycle
/// calls on distinct identifiers.
#[async_trait::async_trait]
pub trait ServiceClient: Send + Sync {
    /// List objects of a kind, one row per object.
    async fn show_objects(
        &self,
        ctx: &CallContext,
        kind: ObjectKind,
        filter: &ShowFilter,
    ) -> Result<Vec<ShowRow>, ServiceError>;

    /// Describe one object as a property bag.
    async fn describe_object(
        &self,
        ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
    ) -> Result<Vec<Property>, ServiceError>;

    /// List the object-level parameters of one object.
    async fn show_parameters(
        &self,
        ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
    ) -> Result<Vec<Property>, ServiceError>;

    /// Create an object.
    async fn create_object(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> Result<(), ServiceError>;

    /// Alter an object: rename, SET bag, or UNSET bag.
    async fn alter_object(
        &self,
        ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
        request: AlterRequest,
    ) -> Result<(), ServiceError>;

    /// Drop an object.
    async fn drop_object(
        &self,
        ctx: &CallContext,
        request: DropRequest,
    ) -> Result<(), ServiceError>;

    /// The identity of the current session.
    async fn current_session(&self, ctx: &CallContext) -> Result<SessionInfo, ServiceError>;
}
