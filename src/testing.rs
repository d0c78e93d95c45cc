//! Test doubles for exercising the dispatcher without a real Service.
//!
//! [`FakeService`] is an in-memory [`ServiceClient`]: it stores objects
//! keyed by kind and canonical identifier, records every call it receives,
//! can be primed to fail the next N calls, and can be scripted with show
//! listings that override the store (for driving asynchronous-transition
//! polls). [`ResourceTester`] bundles a fake with a dispatcher over the
//! built-in registry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::client::{
    AlterRequest, CallContext, CreateRequest, DropRequest, ObjectKind, ServiceClient, SessionInfo,
    ShowFilter, ShowRow,
};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::lifecycle::Dispatcher;
use crate::resources::{default_registry, ResourceRegistry};
use crate::value::{Property, PropertyType};

/// One stored fake object.
#[derive(Debug, Clone)]
pub struct FakeObject {
    /// The show row returned for listings.
    pub row: ShowRow,
    /// The describe property bag.
    pub describe: Vec<Property>,
    /// The object parameters.
    pub parameters: Vec<Property>,
}

impl Default for FakeObject {
    fn default() -> Self {
        Self {
            row: ShowRow::new(""),
            describe: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeInner {
    objects: BTreeMap<(ObjectKind, String), FakeObject>,
    show_scripts: BTreeMap<ObjectKind, VecDeque<Vec<ShowRow>>>,
    fail_next: VecDeque<ServiceError>,
    calls: Vec<String>,
    session: Option<SessionInfo>,
}

/// A scriptable in-memory Service.
#[derive(Debug, Default)]
pub struct FakeService {
    inner: Mutex<FakeInner>,
}

impl FakeService {
    /// An empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object into the store.
    pub fn seed(&self, kind: ObjectKind, id: &ObjectIdentifier, object: FakeObject) {
        self.lock().objects.insert((kind, id.canonical()), object);
    }

    /// Whether an object exists in the store.
    pub fn contains(&self, kind: ObjectKind, id: &ObjectIdentifier) -> bool {
        self.lock().objects.contains_key(&(kind, id.canonical()))
    }

    /// A copy of a stored object.
    pub fn object(&self, kind: ObjectKind, id: &ObjectIdentifier) -> Option<FakeObject> {
        self.lock().objects.get(&(kind, id.canonical())).cloned()
    }

    /// Queue a show listing that overrides the store for one call.
    /// Queued listings are consumed in order; afterwards listings fall
    /// back to the store.
    pub fn script_show(&self, kind: ObjectKind, rows: Vec<ShowRow>) {
        self.lock()
            .show_scripts
            .entry(kind)
            .or_default()
            .push_back(rows);
    }

    /// Fail the next call with the given error.
    pub fn fail_next(&self, error: ServiceError) {
        self.lock().fail_next.push_back(error);
    }

    /// Set the session identity reported by `current_session`.
    pub fn set_session(&self, session: SessionInfo) {
        self.lock().session = Some(session);
    }

    /// Every call received so far, as `"method detail"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// The number of calls whose method matches.
    pub fn call_count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(inner: &mut FakeInner, call: String) -> Result<(), ServiceError> {
        inner.calls.push(call);
        match inner.fail_next.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ServiceClient for FakeService {
    async fn show_objects(
        &self,
        _ctx: &CallContext,
        kind: ObjectKind,
        filter: &ShowFilter,
    ) -> Result<Vec<ShowRow>, ServiceError> {
        let mut inner = self.lock();
        FakeService::record(&mut inner, format!("show_objects {kind}"))?;
        if let Some(scripted) = inner
            .show_scripts
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
        {
            return Ok(scripted);
        }
        Ok(inner
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, object)| object.row.clone())
            .filter(|row| {
                filter
                    .like
                    .as_ref()
                    .map(|like| row.name.eq_ignore_ascii_case(like))
                    .unwrap_or(true)
            })
            .collect())
    }

    async fn describe_object(
        &self,
        _ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
    ) -> Result<Vec<Property>, ServiceError> {
        let mut inner = self.lock();
        FakeService::record(&mut inner, format!("describe_object {kind} {}", id.canonical()))?;
        inner
            .objects
            .get(&(kind, id.canonical()))
            .map(|object| object.describe.clone())
            .ok_or_else(|| ServiceError::NotFound(id.fully_qualified()))
    }

    async fn show_parameters(
        &self,
        _ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
    ) -> Result<Vec<Property>, ServiceError> {
        let mut inner = self.lock();
        FakeService::record(&mut inner, format!("show_parameters {kind} {}", id.canonical()))?;
        inner
            .objects
            .get(&(kind, id.canonical()))
            .map(|object| object.parameters.clone())
            .ok_or_else(|| ServiceError::NotFound(id.fully_qualified()))
    }

    async fn create_object(
        &self,
        _ctx: &CallContext,
        request: CreateRequest,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        FakeService::record(
            &mut inner,
            format!("create_object {} {}", request.kind, request.id.canonical()),
        )?;
        let key = (request.kind, request.id.canonical());
        if inner.objects.contains_key(&key) {
            return Err(ServiceError::Conflict(request.id.fully_qualified()));
        }
        let mut object = FakeObject {
            row: ShowRow::new(request.id.name()),
            ..FakeObject::default()
        };
        for (name, value) in &request.fields {
            if name == "name" {
                continue;
            }
            let text = field_text(value);
            object.row = object.row.with_column(name.clone(), text.clone());
            object
                .describe
                .push(Property::new(name.to_uppercase(), field_type(value), text, ""));
        }
        inner.objects.insert(key, object);
        Ok(())
    }

    async fn alter_object(
        &self,
        _ctx: &CallContext,
        kind: ObjectKind,
        id: &ObjectIdentifier,
        request: AlterRequest,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        FakeService::record(&mut inner, format!("alter_object {kind} {}", id.canonical()))?;
        let key = (kind, id.canonical());
        let mut object = inner
            .objects
            .remove(&key)
            .ok_or_else(|| ServiceError::NotFound(id.fully_qualified()))?;

        if let Some(renamed) = &request.rename_to {
            object.row.name = renamed.name().to_string();
            inner.objects.insert((kind, renamed.canonical()), object);
            return Ok(());
        }
        for (name, value) in &request.set {
            let text = field_text(value);
            object.row = object.row.with_column(name.clone(), text.clone());
            set_property(&mut object.describe, name, field_type(value), text);
        }
        for name in &request.unset {
            object.row.columns.remove(&name.to_lowercase());
            object
                .describe
                .retain(|p| !p.name.eq_ignore_ascii_case(name));
        }
        inner.objects.insert(key, object);
        Ok(())
    }

    async fn drop_object(
        &self,
        _ctx: &CallContext,
        request: DropRequest,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        FakeService::record(
            &mut inner,
            format!("drop_object {} {}", request.kind, request.id.canonical()),
        )?;
        let existed = inner
            .objects
            .remove(&(request.kind, request.id.canonical()))
            .is_some();
        if !existed && !request.if_exists {
            return Err(ServiceError::NotFound(request.id.fully_qualified()));
        }
        Ok(())
    }

    async fn current_session(&self, _ctx: &CallContext) -> Result<SessionInfo, ServiceError> {
        let mut inner = self.lock();
        FakeService::record(&mut inner, "current_session".to_string())?;
        inner
            .session
            .clone()
            .ok_or_else(|| ServiceError::PreconditionFailed("no session configured".to_string()))
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(field_text)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{joined}]")
        }
        other => other.to_string(),
    }
}

fn field_type(value: &Value) -> PropertyType {
    match value {
        Value::Bool(_) => PropertyType::Boolean,
        Value::Number(_) => PropertyType::Number,
        Value::Array(_) => PropertyType::List,
        _ => PropertyType::String,
    }
}

fn set_property(describe: &mut Vec<Property>, name: &str, property_type: PropertyType, text: String) {
    match describe.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
        Some(property) => property.value = text,
        None => describe.push(Property::new(name.to_uppercase(), property_type, text, "")),
    }
}

/// A dispatcher over a [`FakeService`] and the built-in registry.
pub struct ResourceTester {
    service: Arc<FakeService>,
    dispatcher: Dispatcher<FakeService>,
}

impl ResourceTester {
    /// A tester over the built-in resource registry.
    pub fn new() -> Result<Self, ServiceError> {
        Self::with_registry(default_registry()?)
    }

    /// A tester over a custom registry.
    pub fn with_registry(registry: ResourceRegistry) -> Result<Self, ServiceError> {
        let service = Arc::new(FakeService::new());
        let dispatcher = Dispatcher::new(Arc::clone(&service), registry);
        Ok(Self {
            service,
            dispatcher,
        })
    }

    /// The scriptable fake behind the dispatcher.
    pub fn service(&self) -> &FakeService {
        &self.service
    }

    /// The dispatcher under test.
    pub fn dispatcher(&self) -> &Dispatcher<FakeService> {
        &self.dispatcher
    }
}
