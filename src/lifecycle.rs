//! The lifecycle dispatcher.
//!
//! One entry point per lifecycle operation (Create, Read, Update, Delete,
//! Import), each wrapped the same way: resolve the resource definition,
//! enforce the preview gate, attach the tracking marker, enforce the
//! per-operation deadline, and run the remote calls under the bounded
//! transient-retry policy. Every write is followed by a full remote
//! re-read, so the returned state always reflects what the Service
//! actually materialized.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{
    AlterRequest, CallContext, CreateRequest, DropRequest, ServiceClient, ShowFilter,
    TrackingMarker,
};
use crate::config::ProviderConfig;
use crate::drift::{detect_drift, read_remote, ReadOutcome, RemoteSnapshot};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::migrate::MigrationContext;
use crate::reconcile::{build_create_fields, plan_update, ReconcilePlan};
use crate::resources::{ResourceDefinition, ResourceRegistry};
use crate::retry::{poll_until, retry, RetryPolicy};
use crate::schema::{Diagnostic, Operation};
use crate::state::{RawState, StateRecord};
use crate::validation::validate;
use crate::value::eq_ignore_case;

/// The outcome of one lifecycle operation.
#[derive(Debug, Clone, Default)]
pub struct LifecycleResponse {
    /// The new state record; `None` means the resource has no remote
    /// counterpart any more.
    pub state: Option<StateRecord>,
    /// Diagnostics to surface to the user.
    pub diagnostics: Vec<Diagnostic>,
}

impl LifecycleResponse {
    fn gone(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Dispatches lifecycle operations against a shared [`ServiceClient`].
/// Safe to call concurrently for distinct identifiers.
pub struct Dispatcher<C: ServiceClient> {
    client: Arc<C>,
    registry: ResourceRegistry,
    provider_version: String,
    cancel: CancellationToken,
    preview_enabled: BTreeSet<String>,
    transient_policy: RetryPolicy,
    poll_policy: RetryPolicy,
    expected_session: Option<(String, String)>,
}

impl<C: ServiceClient> Dispatcher<C> {
    /// Create a dispatcher over a client and a resource registry.
    pub fn new(client: Arc<C>, registry: ResourceRegistry) -> Self {
        Self {
            client,
            registry,
            provider_version: env!("CARGO_PKG_VERSION").to_string(),
            cancel: CancellationToken::new(),
            preview_enabled: BTreeSet::new(),
            transient_policy: RetryPolicy::transient(),
            poll_policy: RetryPolicy::state_poll(),
            expected_session: None,
        }
    }

    /// Apply provider-level configuration: preview opt-ins and retry/poll
    /// overrides.
    pub fn with_config(mut self, config: &ProviderConfig) -> Self {
        for type_name in &config.preview_features {
            self.preview_enabled.insert(type_name.clone());
        }
        self.transient_policy = config.transient_policy();
        self.poll_policy = config.poll_policy();
        self.expected_session = config
            .expected_session()
            .map(|(org, account)| (org.to_string(), account.to_string()));
        self
    }

    /// Check the live session identity against the configured expectation.
    /// Returns no diagnostics when they match or when no expectation is
    /// configured; a mismatch is an error diagnostic, so the host refuses
    /// to reconcile against the wrong account.
    pub async fn verify_session(&self) -> Result<Vec<Diagnostic>, ServiceError> {
        let Some((org, account)) = &self.expected_session else {
            return Ok(Vec::new());
        };
        let ctx = CallContext::new(self.cancel.child_token());
        let session = retry(self.transient_policy, &ctx.cancel, || {
            self.client.current_session(&ctx)
        })
        .await?;
        if eq_ignore_case(&session.organization, org) && eq_ignore_case(&session.account, account) {
            return Ok(Vec::new());
        }
        Ok(vec![Diagnostic::error(format!(
            "session identity mismatch: connected to {}.{}, expected {org}.{account}",
            session.organization, session.account
        ))
        .with_detail("check the credentials the client was built with")])
    }

    /// Override the version reported in tracking markers.
    pub fn with_provider_version(mut self, version: impl Into<String>) -> Self {
        self.provider_version = version.into();
        self
    }

    /// Use a host-supplied cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Allow a preview-gated resource type.
    pub fn with_preview_enabled(mut self, type_name: impl Into<String>) -> Self {
        self.preview_enabled.insert(type_name.into());
        self
    }

    /// Create the remote object, then read it back.
    #[instrument(skip(self, config), fields(resource = type_name))]
    pub async fn create(
        &self,
        type_name: &str,
        config: Map<String, Value>,
    ) -> Result<LifecycleResponse, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Create);
        let deadline = def.schema.timeouts.for_operation(Operation::Create);
        tokio::time::timeout(deadline, self.create_inner(def, &ctx, config))
            .await
            .map_err(|_| deadline_error(Operation::Create, deadline))?
    }

    async fn create_inner(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        config: Map<String, Value>,
    ) -> Result<LifecycleResponse, ServiceError> {
        let diagnostics = validate(&def.schema, &Value::Object(config.clone()));
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(LifecycleResponse {
                state: None,
                diagnostics,
            });
        }

        let id = def.id_for(&config)?;
        let fields = build_create_fields(&def.schema, &config)?;
        info!(id = %id.fully_qualified(), "creating object");
        retry(self.transient_policy, &ctx.cancel, || {
            self.client.create_object(
                ctx,
                CreateRequest {
                    kind: def.kind,
                    id: id.clone(),
                    fields: fields.clone(),
                },
            )
        })
        .await?;

        let mut record = StateRecord::new(id, def.type_name, def.schema.version);
        record.attributes = config;
        match self.read_record(def, ctx, record).await? {
            Some((record, mut extra)) => {
                let mut diagnostics = diagnostics;
                diagnostics.append(&mut extra);
                Ok(LifecycleResponse {
                    state: Some(record),
                    diagnostics,
                })
            }
            None => Err(ServiceError::Protocol(
                "object not visible after create".to_string(),
            )),
        }
    }

    /// Read remote state back into the record, detecting external drift.
    #[instrument(skip(self, raw), fields(resource = type_name))]
    pub async fn read(
        &self,
        type_name: &str,
        raw: RawState,
    ) -> Result<LifecycleResponse, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Read);
        let deadline = def.schema.timeouts.for_operation(Operation::Read);
        tokio::time::timeout(deadline, self.read_inner(def, &ctx, raw))
            .await
            .map_err(|_| deadline_error(Operation::Read, deadline))?
    }

    async fn read_inner(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        raw: RawState,
    ) -> Result<LifecycleResponse, ServiceError> {
        let record = self.migrate_record(def, ctx, raw).await?;
        match self.read_record(def, ctx, record).await? {
            Some((record, diagnostics)) => Ok(LifecycleResponse {
                state: Some(record),
                diagnostics,
            }),
            None => Ok(LifecycleResponse::gone(vec![removed_warning(def)])),
        }
    }

    /// Compute the reconciliation plan without touching the remote (beyond
    /// a session lookup when an old record needs one for migration).
    pub async fn plan(
        &self,
        type_name: &str,
        raw: RawState,
        config: &Map<String, Value>,
    ) -> Result<ReconcilePlan, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Update);
        let record = self.migrate_record(def, &ctx, raw).await?;
        let remote = stored_remote_map(&record);
        plan_update(&def.schema, &record.attributes, config, Some(&remote))
    }

    /// Alter the remote object to match the configuration, then read it
    /// back. An empty plan performs no remote calls at all.
    #[instrument(skip(self, raw, config), fields(resource = type_name))]
    pub async fn update(
        &self,
        type_name: &str,
        raw: RawState,
        config: Map<String, Value>,
    ) -> Result<LifecycleResponse, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Update);
        let deadline = def.schema.timeouts.for_operation(Operation::Update);
        tokio::time::timeout(deadline, self.update_inner(def, &ctx, raw, config))
            .await
            .map_err(|_| deadline_error(Operation::Update, deadline))?
    }

    async fn update_inner(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        raw: RawState,
        config: Map<String, Value>,
    ) -> Result<LifecycleResponse, ServiceError> {
        let diagnostics = validate(&def.schema, &Value::Object(config.clone()));
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(LifecycleResponse {
                state: None,
                diagnostics,
            });
        }
        let mut record = self.migrate_record(def, ctx, raw).await?;
        let remote = stored_remote_map(&record);
        let plan = plan_update(&def.schema, &record.attributes, &config, Some(&remote))?;

        if plan.requires_replace {
            return Err(ServiceError::PreconditionFailed(
                "the planned change requires replacing the object".to_string(),
            ));
        }
        if plan.is_empty() {
            debug!("plan is empty; skipping all remote calls");
            record.attributes = config;
            return Ok(LifecycleResponse {
                state: Some(record),
                diagnostics,
            });
        }

        // Rename first, so every subsequent alter addresses the new name.
        if let Some(new_name) = &plan.rename_to {
            let renamed = record.id.with_name(new_name.clone());
            info!(to = %renamed.fully_qualified(), "renaming object");
            retry(self.transient_policy, &ctx.cancel, || {
                self.client.alter_object(
                    ctx,
                    def.kind,
                    &record.id,
                    AlterRequest::rename(renamed.clone()),
                )
            })
            .await?;
            record.id = renamed;
        }

        for (flow, bag) in &plan.flows {
            if bag.is_empty() {
                continue;
            }
            debug!(flow = %flow, sets = bag.set.len(), unsets = bag.unset.len(), "altering object");
            retry(self.transient_policy, &ctx.cancel, || {
                self.client
                    .alter_object(ctx, def.kind, &record.id, bag.clone())
            })
            .await?;
        }

        let mut diagnostics = diagnostics;
        if let Some(check) = &def.convergence {
            if check.applies(&plan.changed_names()) {
                let converged = poll_until(self.poll_policy, &ctx.cancel, || {
                    self.probe_convergence(def, ctx, &record.id, &config)
                })
                .await?;
                if !converged {
                    warn!("remote state did not settle within the polling window");
                    diagnostics.push(
                        Diagnostic::warning("remote state still settling")
                            .with_detail(
                                "the object did not reach the requested state within the \
                                 polling window; the next read will pick up the final state",
                            ),
                    );
                }
            }
        }

        record.attributes = config;
        match self.read_record(def, ctx, record).await? {
            Some((record, mut extra)) => {
                diagnostics.append(&mut extra);
                Ok(LifecycleResponse {
                    state: Some(record),
                    diagnostics,
                })
            }
            None => Err(ServiceError::Protocol(
                "object not visible after update".to_string(),
            )),
        }
    }

    /// Drop the remote object. Dropping an already-gone object succeeds.
    #[instrument(skip(self, raw), fields(resource = type_name))]
    pub async fn delete(
        &self,
        type_name: &str,
        raw: RawState,
    ) -> Result<LifecycleResponse, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Delete);
        let deadline = def.schema.timeouts.for_operation(Operation::Delete);
        tokio::time::timeout(deadline, self.delete_inner(def, &ctx, raw))
            .await
            .map_err(|_| deadline_error(Operation::Delete, deadline))?
    }

    async fn delete_inner(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        raw: RawState,
    ) -> Result<LifecycleResponse, ServiceError> {
        let record = self.migrate_record(def, ctx, raw).await?;
        info!(id = %record.id.fully_qualified(), "dropping object");
        let result = retry(self.transient_policy, &ctx.cancel, || {
            self.client.drop_object(
                ctx,
                DropRequest {
                    kind: def.kind,
                    id: record.id.clone(),
                    if_exists: true,
                },
            )
        })
        .await;
        match result {
            Ok(()) => Ok(LifecycleResponse::default()),
            Err(err) if err.is_not_found() => {
                debug!("object already gone; delete is a no-op");
                Ok(LifecycleResponse::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Adopt an existing remote object into state from its qualified name.
    #[instrument(skip(self), fields(resource = type_name))]
    pub async fn import(
        &self,
        type_name: &str,
        id_text: &str,
    ) -> Result<LifecycleResponse, ServiceError> {
        let def = self.definition(type_name)?;
        let ctx = self.context(def, Operation::Import);
        let deadline = def.schema.timeouts.for_operation(Operation::Import);
        tokio::time::timeout(deadline, self.import_inner(def, &ctx, id_text))
            .await
            .map_err(|_| deadline_error(Operation::Import, deadline))?
    }

    async fn import_inner(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        id_text: &str,
    ) -> Result<LifecycleResponse, ServiceError> {
        let id = ObjectIdentifier::parse(id_text)?;
        let record = StateRecord::new(id, def.type_name, def.schema.version);
        match self.read_record(def, ctx, record).await? {
            Some((record, diagnostics)) => Ok(LifecycleResponse {
                state: Some(record),
                diagnostics,
            }),
            None => Err(ServiceError::NotFound(format!(
                "no {} named {id_text}",
                def.kind
            ))),
        }
    }

    fn definition(&self, type_name: &str) -> Result<&ResourceDefinition, ServiceError> {
        let def = self.registry.get(type_name).ok_or_else(|| {
            ServiceError::InvalidArgument(format!("unknown resource type {type_name:?}"))
        })?;
        if def.schema.preview && !self.preview_enabled.contains(type_name) {
            return Err(ServiceError::PreconditionFailed(format!(
                "resource type {type_name:?} is in preview and not enabled"
            )));
        }
        Ok(def)
    }

    fn context(&self, def: &ResourceDefinition, operation: Operation) -> CallContext {
        CallContext::new(self.cancel.child_token()).with_tracking(TrackingMarker::new(
            self.provider_version.clone(),
            def.type_name,
            operation,
        ))
    }

    /// Upgrade a raw record to the current schema version, fetching the
    /// session identity only when an applicable upgrader needs it.
    async fn migrate_record(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        raw: RawState,
    ) -> Result<StateRecord, ServiceError> {
        let target = def.schema.version;
        let from = raw
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let mut migration = MigrationContext::default();
        if def.migrator.needs_session(from, target) {
            migration.session = Some(self.client.current_session(ctx).await?);
        }
        let upgraded = def.migrator.upgrade(raw, target, &migration)?;
        StateRecord::from_raw(upgraded)
    }

    /// Read the remote object back into the record. `None` means gone.
    async fn read_record(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        mut record: StateRecord,
    ) -> Result<Option<(StateRecord, Vec<Diagnostic>)>, ServiceError> {
        let outcome = retry(self.transient_policy, &ctx.cancel, || {
            read_remote(&*self.client, ctx, def.kind, &record.id, def.surfaces)
        })
        .await?;
        let snapshot = match outcome {
            ReadOutcome::Gone => return Ok(None),
            ReadOutcome::Live(snapshot) => snapshot,
        };

        let drifted = detect_drift(&def.schema, &mut record.attributes, &snapshot, &def.probes)?;
        let mut diagnostics = Vec::new();
        for name in &drifted {
            debug!(attribute = %name, "adopted externally changed value");
            diagnostics.push(
                Diagnostic::warning(format!("attribute {name:?} was changed outside of management"))
                    .with_attribute(name.clone()),
            );
        }
        record.show_snapshot = snapshot.show.clone();
        record.describe_snapshot = snapshot.describe.clone();
        record.parameters = snapshot.parameters.clone();
        record.schema_version = def.schema.version;
        Ok(Some((record, diagnostics)))
    }

    async fn probe_convergence(
        &self,
        def: &ResourceDefinition,
        ctx: &CallContext,
        id: &ObjectIdentifier,
        config: &Map<String, Value>,
    ) -> Result<bool, ServiceError> {
        let check = match &def.convergence {
            Some(check) => check,
            None => return Ok(true),
        };
        let rows = self
            .client
            .show_objects(ctx, def.kind, &ShowFilter::by_id(id))
            .await?;
        Ok(rows
            .iter()
            .find(|row| eq_ignore_case(&row.name, id.name()))
            .map(|row| (check.converged)(config, row))
            .unwrap_or(false))
    }
}

/// The remote attribute view stored on the record, for suppressors that
/// compare against the last-read remote value.
fn stored_remote_map(record: &StateRecord) -> Map<String, Value> {
    RemoteSnapshot {
        show: record.show_snapshot.clone(),
        describe: record.describe_snapshot.clone(),
        parameters: record.parameters.clone(),
    }
    .as_map()
}

fn removed_warning(def: &ResourceDefinition) -> Diagnostic {
    Diagnostic::warning(format!("{} removed outside of management", def.kind)).with_detail(
        "the remote object no longer exists; it will be recreated on the next apply",
    )
}

fn deadline_error(operation: Operation, deadline: std::time::Duration) -> ServiceError {
    ServiceError::DeadlineExceeded(format!(
        "{} did not finish within {}s",
        operation.as_str(),
        deadline.as_secs()
    ))
}
