//! Reading remote state back and detecting external drift.
//!
//! A Read composes up to three remote surfaces: the show listing (always),
//! the describe property bag, and the object parameters. The composed
//! [`RemoteSnapshot`] is then projected back onto the declared attribute
//! map; a projected value that differs from the declared one, and is not
//! suppressed by the attribute's rules, is external drift and overwrites
//! the declared value so the host can surface it.
//!
//! Some attributes have no dedicated column; they are recovered from a
//! larger text field (typically the reconstructed DDL) by a [`TextProbe`].
//! Probe misses are expected for objects created out-of-band and are never
//! fatal.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{CallContext, ObjectKind, ServiceClient, ShowFilter, ShowRow};
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::schema::{AttributeDescriptor, ResourceSchema, SemanticType};
use crate::value::{eq_ignore_case, parse_delimited_list, PropertyBag};

/// Recovers one attribute from a larger remote text field by regular
/// expression; capture group 1 is the attribute value.
#[derive(Debug, Clone)]
pub struct TextProbe {
    /// The attribute the probe populates.
    pub attribute: String,
    /// The snapshot field the probe scans.
    pub source: String,
    pattern: Regex,
}

impl TextProbe {
    /// Compile a probe. The pattern must contain at least one capture
    /// group.
    pub fn new(
        attribute: impl Into<String>,
        source: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, ServiceError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| ServiceError::Fatal(format!("invalid probe pattern: {err}")))?;
        Ok(Self {
            attribute: attribute.into(),
            source: source.into(),
            pattern,
        })
    }

    /// Run the probe over a source text.
    pub fn extract(&self, text: &str) -> Option<String> {
        match self.pattern.captures(text) {
            Some(captures) => captures.get(1).map(|m| m.as_str().to_string()),
            None => {
                debug!(attribute = %self.attribute, "probe found no match");
                None
            }
        }
    }
}

/// The composed remote view of one object.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    /// The show row, if the object was listed.
    pub show: Option<ShowRow>,
    /// The describe property bag, when the kind supports describe.
    pub describe: Option<PropertyBag>,
    /// Object parameters, keyed by parameter name.
    pub parameters: BTreeMap<String, String>,
}

impl RemoteSnapshot {
    /// Read one field, preferring the describe bag over show columns.
    pub fn field(&self, name: &str) -> Option<&str> {
        if let Some(bag) = &self.describe {
            if let Some(text) = bag.text_value(name) {
                return Some(text);
            }
        }
        self.show.as_ref().and_then(|row| row.get(name))
    }

    /// The attribute map view of the snapshot, used by remote-value
    /// suppressors.
    pub fn as_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(row) = &self.show {
            map.insert("name".to_string(), Value::from(row.name.clone()));
            for (column, value) in &row.columns {
                map.insert(column.clone(), Value::from(value.clone()));
            }
        }
        if let Some(bag) = &self.describe {
            for property in bag.entries() {
                map.insert(
                    property.name.to_lowercase(),
                    Value::from(property.value.clone()),
                );
            }
        }
        map
    }
}

/// The result of a remote read.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// The object no longer exists.
    Gone,
    /// The object exists; here is its composed remote view.
    Live(RemoteSnapshot),
}

/// What a resource wants read beyond the show listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadSurfaces {
    /// Also describe the object.
    pub describe: bool,
    /// Also list the object parameters.
    pub parameters: bool,
}

/// Read the composed remote view of one object. A missing show row, or a
/// not-found failure from any surface, reports the object gone rather than
/// failing the read.
pub async fn read_remote<C: ServiceClient + ?Sized>(
    client: &C,
    ctx: &CallContext,
    kind: ObjectKind,
    id: &ObjectIdentifier,
    surfaces: ReadSurfaces,
) -> Result<ReadOutcome, ServiceError> {
    let rows = match client.show_objects(ctx, kind, &ShowFilter::by_id(id)).await {
        Ok(rows) => rows,
        Err(err) if err.is_not_found() => return Ok(ReadOutcome::Gone),
        Err(err) => return Err(err),
    };
    let row = rows.into_iter().find(|row| eq_ignore_case(&row.name, id.name()));
    let Some(row) = row else {
        return Ok(ReadOutcome::Gone);
    };

    let mut snapshot = RemoteSnapshot {
        show: Some(row),
        ..RemoteSnapshot::default()
    };
    if surfaces.describe {
        match client.describe_object(ctx, kind, id).await {
            Ok(properties) => snapshot.describe = Some(PropertyBag::new(properties)),
            Err(err) if err.is_not_found() => return Ok(ReadOutcome::Gone),
            Err(err) => return Err(err),
        }
    }
    if surfaces.parameters {
        match client.show_parameters(ctx, kind, id).await {
            Ok(parameters) => {
                snapshot.parameters = parameters
                    .into_iter()
                    .map(|p| (p.name, p.value))
                    .collect();
            }
            Err(err) if err.is_not_found() => return Ok(ReadOutcome::Gone),
            Err(err) => return Err(err),
        }
    }
    Ok(ReadOutcome::Live(snapshot))
}

/// Project the snapshot back onto the declared attribute map. Declared
/// values that differ from the remote, and are not suppressed, are
/// overwritten; computed attributes are always overwritten. Returns the
/// names of the drifted declared attributes.
pub fn detect_drift(
    schema: &ResourceSchema,
    attributes: &mut Map<String, Value>,
    snapshot: &RemoteSnapshot,
    probes: &[TextProbe],
) -> Result<Vec<String>, ServiceError> {
    let remote_map = snapshot.as_map();
    let mut drifted = Vec::new();

    for (name, descriptor) in &schema.attributes {
        let remote_text = probe_or_field(name, snapshot, probes);
        let Some(remote_text) = remote_text else {
            continue;
        };
        let remote_value = convert_remote(descriptor, &remote_text)?;

        if descriptor.computed && !descriptor.optional && !descriptor.required {
            attributes.insert(name.clone(), remote_value);
            continue;
        }

        let prior = attributes.get(name);
        // A declared "take the default" never drifts against whatever the
        // Service materialized for it. Tri-states still adopt the explicit
        // value the Service chose, so state always shows it.
        if descriptor.is_unset(prior) {
            if matches!(descriptor.semantic_type, SemanticType::TriStateBool) {
                attributes.insert(name.clone(), remote_value);
            }
            continue;
        }
        let prior_norm = prior.map(|v| descriptor.normalize(v)).unwrap_or(Value::Null);
        let remote_norm = descriptor.normalize(&remote_value);
        if descriptor
            .suppress
            .suppressed(&prior_norm, &remote_norm, remote_map.get(name))
        {
            continue;
        }
        debug!(attribute = %name, "declared value drifted from remote");
        attributes.insert(name.clone(), remote_value);
        drifted.push(name.clone());
    }
    Ok(drifted)
}

fn probe_or_field(name: &str, snapshot: &RemoteSnapshot, probes: &[TextProbe]) -> Option<String> {
    if let Some(probe) = probes.iter().find(|p| p.attribute == name) {
        let source = snapshot.field(&probe.source)?;
        return probe.extract(source);
    }
    snapshot.field(name).map(str::to_string)
}

/// Convert one remote text field into the declared representation.
fn convert_remote(
    descriptor: &AttributeDescriptor,
    text: &str,
) -> Result<Value, ServiceError> {
    match &descriptor.semantic_type {
        SemanticType::Integer => text.trim().parse::<i64>().map(Value::from).map_err(|_| {
            ServiceError::Protocol(format!("remote reported non-numeric value {text:?}"))
        }),
        SemanticType::Float => text.trim().parse::<f64>().map(Value::from).map_err(|_| {
            ServiceError::Protocol(format!("remote reported non-numeric value {text:?}"))
        }),
        SemanticType::TriStateBool => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::from("true")),
            "false" => Ok(Value::from("false")),
            other => Err(ServiceError::Protocol(format!(
                "remote reported non-boolean value {other:?}"
            ))),
        },
        SemanticType::List(_) | SemanticType::Set(_) => Ok(Value::Array(
            parse_delimited_list(text).into_iter().map(Value::from).collect(),
        )),
        SemanticType::Text | SemanticType::Record(_) => Ok(Value::from(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDescriptor;
    use crate::suppress::enum_normalization;
    use crate::value::{Property, PropertyType};
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::v(1)
            .with_attribute("name", AttributeDescriptor::text().required())
            .with_attribute(
                "warehouse_size",
                AttributeDescriptor::text()
                    .optional()
                    .with_suppressor(enum_normalization),
            )
            .with_attribute("auto_suspend", AttributeDescriptor::integer().optional())
            .with_attribute("auto_resume", AttributeDescriptor::tri_state().optional())
            .with_attribute("state", AttributeDescriptor::text().computed())
            .with_attribute("schedule", AttributeDescriptor::text().optional())
    }

    fn snapshot() -> RemoteSnapshot {
        RemoteSnapshot {
            show: Some(
                ShowRow::new("WH1")
                    .with_column("state", "SUSPENDED")
                    .with_column("auto_resume", "true"),
            ),
            describe: Some(PropertyBag::new(vec![
                Property::new("WAREHOUSE_SIZE", PropertyType::String, "xsmall", ""),
                Property::new("AUTO_SUSPEND", PropertyType::Number, "300", "600"),
            ])),
            parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn snapshot_prefers_describe_over_show() {
        let snap = RemoteSnapshot {
            show: Some(ShowRow::new("WH1").with_column("comment", "from show")),
            describe: Some(PropertyBag::new(vec![Property::new(
                "COMMENT",
                PropertyType::String,
                "from describe",
                "",
            )])),
            parameters: BTreeMap::new(),
        };
        assert_eq!(snap.field("comment"), Some("from describe"));
        assert_eq!(snap.field("state"), None);
    }

    #[test]
    fn computed_attributes_are_always_refreshed() {
        let mut attrs = json_map(json!({"name": "WH1", "state": "STARTED"}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        assert_eq!(attrs.get("state"), Some(&json!("SUSPENDED")));
        // Computed refreshes are not drift.
        assert!(!drifted.contains(&"state".to_string()));
    }

    #[test]
    fn external_change_overwrites_the_declared_value() {
        let mut attrs = json_map(json!({"name": "WH1", "auto_suspend": 600}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        assert_eq!(attrs.get("auto_suspend"), Some(&json!(300)));
        assert_eq!(drifted, vec!["auto_suspend".to_string()]);
    }

    #[test]
    fn suppressed_remote_spelling_is_not_drift() {
        let mut attrs = json_map(json!({"name": "WH1", "warehouse_size": "XSMALL", "auto_suspend": 300}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        // "xsmall" vs "XSMALL" differ, but not case-insensitively.
        assert_eq!(attrs.get("warehouse_size"), Some(&json!("XSMALL")));
        assert!(drifted.is_empty());
    }

    #[test]
    fn unset_tri_state_adopts_the_service_choice_without_drift() {
        let mut attrs = json_map(json!({"name": "WH1", "auto_resume": "default"}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        assert_eq!(attrs.get("auto_resume"), Some(&json!("true")));
        assert!(drifted.is_empty());
    }

    #[test]
    fn other_unset_declared_values_never_drift() {
        let mut attrs = json_map(json!({"name": "WH1", "auto_suspend": -1}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        assert_eq!(attrs.get("auto_suspend"), Some(&json!(-1)));
        assert!(drifted.is_empty());
    }

    #[test]
    fn tri_state_read_back_is_explicit() {
        let mut attrs = json_map(json!({"name": "WH1", "auto_resume": "false"}));
        let drifted = detect_drift(&schema(), &mut attrs, &snapshot(), &[]).unwrap();
        assert_eq!(attrs.get("auto_resume"), Some(&json!("true")));
        assert_eq!(drifted, vec!["auto_resume".to_string()]);
    }

    #[test]
    fn probes_recover_fields_from_larger_text() {
        let probe = TextProbe::new(
            "schedule",
            "definition",
            r"(?i)SCHEDULE\s*=\s*'([^']+)'",
        )
        .unwrap();
        let snap = RemoteSnapshot {
            show: Some(
                ShowRow::new("A1")
                    .with_column("definition", "CREATE ALERT A1 SCHEDULE = '60 MINUTE' AS ..."),
            ),
            ..RemoteSnapshot::default()
        };
        let mut attrs = json_map(json!({"name": "A1", "schedule": "30 MINUTE"}));
        let drifted = detect_drift(&schema(), &mut attrs, &snap, &[probe]).unwrap();
        assert_eq!(attrs.get("schedule"), Some(&json!("60 MINUTE")));
        assert_eq!(drifted, vec!["schedule".to_string()]);
    }

    #[test]
    fn probe_misses_are_not_fatal() {
        let probe = TextProbe::new("schedule", "definition", r"SCHEDULE = '([^']+)'").unwrap();
        assert_eq!(probe.extract("CREATE ALERT A1 AS ..."), None);
    }

    #[test]
    fn garbled_remote_numbers_are_protocol_errors() {
        let snap = RemoteSnapshot {
            describe: Some(PropertyBag::new(vec![Property::new(
                "AUTO_SUSPEND",
                PropertyType::Number,
                "soon",
                "",
            )])),
            ..RemoteSnapshot::default()
        };
        let mut attrs = json_map(json!({"name": "WH1", "auto_suspend": 600}));
        let err = detect_drift(&schema(), &mut attrs, &snap, &[]).unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    fn json_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }
}
