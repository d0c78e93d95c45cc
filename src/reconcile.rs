//! The reconciliation engine.
//!
//! Given prior state and desired config, computes field-level changes
//! against the attribute descriptors and folds them into per-flow
//! SET/UNSET bags. A flow is a semantically coherent subset of an object's
//! attributes that must be altered together; each non-empty bag maps to
//! exactly one alter call, and empty bags are skipped entirely.
//!
//! Recreation policy: a change forces replacement iff the descriptor says
//! so statically, or its conditional predicate fires (e.g. clearing a
//! field the Service cannot unset). A replacing plan carries no alter
//! bags; the host performs Delete+Create instead.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::client::AlterRequest;
use crate::error::ServiceError;
use crate::schema::{AttributeDescriptor, ResourceSchema, SemanticType};
use crate::value::{flatten, sets_equal, TriStateBool};

/// The flow attributes belong to when none is declared.
pub const MAIN_FLOW: &str = "main";

/// One detected field-level change.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Attribute name.
    pub name: String,
    /// The prior value, if any.
    pub prior: Option<Value>,
    /// The desired value, if any.
    pub planned: Option<Value>,
    /// Whether this change forces replacement.
    pub forces_recreate: bool,
}

/// The computed reconciliation plan for one Update.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// All surviving field-level changes.
    pub changes: Vec<FieldChange>,
    /// The resource must be replaced rather than altered.
    pub requires_replace: bool,
    /// New object name; the rename is issued before any other alter.
    pub rename_to: Option<String>,
    /// Per-flow alter bags, keyed by flow name.
    pub flows: BTreeMap<String, AlterRequest>,
    /// Computed attributes to re-read because a trigger changed.
    pub stale_observers: Vec<String>,
}

impl ReconcilePlan {
    /// Whether the plan performs no remote work at all.
    pub fn is_empty(&self) -> bool {
        !self.requires_replace
            && self.rename_to.is_none()
            && self.flows.values().all(AlterRequest::is_empty)
    }

    /// The names of all changed attributes.
    pub fn changed_names(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.name.clone()).collect()
    }
}

/// Compute the plan for an in-place update. `remote` is the last-read
/// remote attribute map, consulted by remote-value suppressors.
pub fn plan_update(
    schema: &ResourceSchema,
    prior: &Map<String, Value>,
    config: &Map<String, Value>,
    remote: Option<&Map<String, Value>>,
) -> Result<ReconcilePlan, ServiceError> {
    let mut plan = ReconcilePlan::default();

    for (name, descriptor) in &schema.attributes {
        if is_pure_computed(descriptor) {
            continue;
        }
        let prior_value = prior.get(name);
        let config_value = config.get(name);

        if descriptor.is_unset(prior_value) && descriptor.is_unset(config_value) {
            continue;
        }

        let prior_norm = normalized(descriptor, prior_value);
        let config_norm = normalized(descriptor, config_value);
        let remote_value = remote.and_then(|m| m.get(name));
        if descriptor
            .suppress
            .suppressed(&prior_norm, &config_norm, remote_value)
        {
            continue;
        }
        if matches!(descriptor.semantic_type, SemanticType::Set(_)) && multisets_match(&prior_norm, &config_norm) {
            continue;
        }

        let forces_recreate = descriptor.force_new
            || descriptor
                .recreate_if
                .map(|predicate| predicate(&prior_norm, &config_norm))
                .unwrap_or(false);

        // Records diff leaf-by-leaf under `name.index.subfield` keys, so
        // key order never reads as a change and the changed leaves are
        // reported individually. The alter still carries the whole record.
        if matches!(descriptor.semantic_type, SemanticType::Record(_)) {
            let prior_flat = flatten(name, &prior_norm);
            let config_flat = flatten(name, &config_norm);
            if prior_flat == config_flat {
                continue;
            }
            let leaves: std::collections::BTreeSet<&String> = prior_flat
                .keys()
                .chain(config_flat.keys())
                .filter(|key| prior_flat.get(*key) != config_flat.get(*key))
                .collect();
            for leaf in leaves {
                plan.changes.push(FieldChange {
                    name: leaf.clone(),
                    prior: prior_flat.get(leaf).cloned(),
                    planned: config_flat.get(leaf).cloned(),
                    forces_recreate,
                });
            }
        } else {
            plan.changes.push(FieldChange {
                name: name.clone(),
                prior: prior_value.cloned(),
                planned: config_value.cloned(),
                forces_recreate,
            });
        }
        if forces_recreate {
            plan.requires_replace = true;
            continue;
        }

        if descriptor.renames_object {
            if let Some(new_name) = config_value.and_then(Value::as_str) {
                plan.rename_to = Some(new_name.to_string());
            }
            continue;
        }

        let flow = descriptor
            .flow
            .clone()
            .unwrap_or_else(|| MAIN_FLOW.to_string());
        let bag = plan.flows.entry(flow).or_default();
        if descriptor.is_unset(config_value) {
            match &descriptor.unset_fallback {
                // The Service offers no UNSET here; SET the documented
                // default instead.
                Some(fallback) => {
                    bag.set.insert(name.clone(), fallback.clone());
                }
                None => bag.unset.push(name.clone()),
            }
        } else {
            let encoded = encode_for_request(descriptor, config_value)?;
            bag.set.insert(name.clone(), encoded);
        }
    }

    plan.stale_observers = schema.stale_observers(&plan.changed_names());

    // A replacing plan issues no alters.
    if plan.requires_replace {
        plan.flows.clear();
        plan.rename_to = None;
    }

    let mut plan = plan;
    for transform in &schema.diff_transforms {
        plan = transform(schema, plan);
        if plan.requires_replace {
            plan.flows.clear();
            plan.rename_to = None;
        }
    }
    Ok(plan)
}

/// Build the field bag for a create request: every declared, explicitly
/// set attribute. Sentinels, empty strings, and tri-state defaults are
/// omitted so the Service applies its own defaults.
pub fn build_create_fields(
    schema: &ResourceSchema,
    config: &Map<String, Value>,
) -> Result<BTreeMap<String, Value>, ServiceError> {
    let mut fields = BTreeMap::new();
    for (name, descriptor) in &schema.attributes {
        if is_pure_computed(descriptor) {
            continue;
        }
        let value = config.get(name);
        if descriptor.is_unset(value) {
            continue;
        }
        fields.insert(name.clone(), encode_for_request(descriptor, value)?);
    }
    Ok(fields)
}

fn is_pure_computed(descriptor: &AttributeDescriptor) -> bool {
    descriptor.computed && !descriptor.optional && !descriptor.required
}

fn normalized(descriptor: &AttributeDescriptor, value: Option<&Value>) -> Value {
    match value {
        Some(v) => descriptor.normalize(v),
        None => Value::Null,
    }
}

fn multisets_match(prior: &Value, config: &Value) -> bool {
    match (prior.as_array(), config.as_array()) {
        (Some(a), Some(b)) => sets_equal(a, b),
        _ => false,
    }
}

/// Encode a declared value into its request form. Tri-states become the
/// explicit boolean; everything else passes through.
fn encode_for_request(
    descriptor: &AttributeDescriptor,
    value: Option<&Value>,
) -> Result<Value, ServiceError> {
    match descriptor.semantic_type {
        SemanticType::TriStateBool => {
            let tri = TriStateBool::from_attribute(value)?;
            match tri.explicit() {
                Some(b) => Ok(Value::Bool(b)),
                None => Err(ServiceError::Fatal(
                    "tri-state default reached request encoding".to_string(),
                )),
            }
        }
        _ => Ok(value.cloned().unwrap_or(Value::Null)),
    }
}
