//! Value codec between declared-schema values and the Service's surfaces.
//!
//! The Service reports object detail as a **property bag**: an ordered
//! sequence of `(name, type-tag, value, default)` records, all transported
//! as text. This module converts between that representation, the declared
//! attribute values (JSON-backed), and the request bags the reconciler
//! emits. It also hosts the normalization helpers shared by the
//! diff-suppression rules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

/// Sentinel for "the user did not set this integer"; every field using it
/// documents a non-negative legal domain, so `-1` is always out-of-domain.
pub const UNSET_INT: i64 = -1;

/// A user-facing boolean that distinguishes "take the Service default"
/// from an explicit value. Encoded as the strings `"true"`, `"false"`,
/// `"default"` at the schema surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriStateBool {
    /// Explicitly enabled.
    True,
    /// Explicitly disabled.
    False,
    /// Not set; accept whatever the Service has.
    #[default]
    Default,
}

impl TriStateBool {
    /// Parse the schema-surface spelling, case-insensitively.
    pub fn parse(text: &str) -> Result<Self, ServiceError> {
        match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Self::True),
            "false" => Ok(Self::False),
            "default" => Ok(Self::Default),
            other => Err(ServiceError::InvalidArgument(format!(
                "expected \"true\", \"false\" or \"default\", got {other:?}"
            ))),
        }
    }

    /// Read a tri-state out of a JSON attribute value. Missing and null
    /// both mean [`TriStateBool::Default`].
    pub fn from_attribute(value: Option<&Value>) -> Result<Self, ServiceError> {
        match value {
            None | Some(Value::Null) => Ok(Self::Default),
            Some(Value::String(s)) => Self::parse(s),
            Some(Value::Bool(b)) => Ok(Self::from_remote(*b)),
            Some(other) => Err(ServiceError::InvalidArgument(format!(
                "expected a tri-state boolean string, got {other}"
            ))),
        }
    }

    /// Convert a Service boolean read back from the remote.
    pub fn from_remote(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    /// The explicit boolean, if one was chosen.
    pub fn explicit(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::Default => None,
        }
    }

    /// The schema-surface spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for TriStateBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of a property bag entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    /// Boolean, transported as `"true"`/`"false"`.
    Boolean,
    /// Integer or decimal, transported as digits.
    Number,
    /// Free text.
    String,
    /// Comma-separated list, possibly bracket-wrapped.
    List,
}

/// One `(name, type, value, default)` record from a describe reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name as reported by the Service.
    pub name: String,
    /// Declared type tag.
    pub property_type: PropertyType,
    /// Current value, as text.
    pub value: String,
    /// The Service default for this property, as text.
    pub default: String,
}

impl Property {
    /// Build a property record.
    pub fn new(
        name: impl Into<String>,
        property_type: PropertyType,
        value: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            property_type,
            value: value.into(),
            default: default.into(),
        }
    }

    /// Whether the current value equals the Service default.
    pub fn is_default(&self) -> bool {
        self.value == self.default
    }
}

/// An ordered property bag with lookup by name and by `(name, type)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBag {
    entries: Vec<Property>,
}

impl PropertyBag {
    /// Wrap a describe reply.
    pub fn new(entries: Vec<Property>) -> Self {
        Self { entries }
    }

    /// All records in reply order.
    pub fn entries(&self) -> &[Property] {
        &self.entries
    }

    /// Look up by name (the Service reports names upper-cased; lookup is
    /// case-insensitive to tolerate both spellings).
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Look up by name and type tag.
    pub fn get_typed(&self, name: &str, property_type: PropertyType) -> Option<&Property> {
        self.entries
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name) && p.property_type == property_type)
    }

    /// Read a boolean property.
    pub fn bool_value(&self, name: &str) -> Result<Option<bool>, ServiceError> {
        match self.get(name) {
            None => Ok(None),
            Some(p) => match p.value.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                "" => Ok(None),
                other => Err(ServiceError::Protocol(format!(
                    "property {} reported non-boolean value {other:?}",
                    p.name
                ))),
            },
        }
    }

    /// Read an integer property.
    pub fn int_value(&self, name: &str) -> Result<Option<i64>, ServiceError> {
        match self.get(name) {
            None => Ok(None),
            Some(p) if p.value.is_empty() => Ok(None),
            Some(p) => p.value.trim().parse::<i64>().map(Some).map_err(|_| {
                ServiceError::Protocol(format!(
                    "property {} reported non-numeric value {:?}",
                    p.name, p.value
                ))
            }),
        }
    }

    /// Read a text property. Empty text is reported as `None`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .map(|p| p.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Read a list property, tolerating surrounding brackets and quotes.
    pub fn list_value(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|p| parse_delimited_list(&p.value))
    }
}

/// Case-insensitive string equality (enum spellings, identifiers the
/// Service case-folds).
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Collapse runs of whitespace to a single space, trim, and fold case.
/// The Service does not round-trip statement text verbatim, so SQL-text
/// fields are compared through this normal form.
pub fn normalize_statement(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two SQL-text fields are semantically equal.
pub fn statements_equal(a: &str, b: &str) -> bool {
    normalize_statement(a) == normalize_statement(b)
}

/// Parse a comma-separated list, tolerating `[...]` wrapping and quoted
/// elements, as the Service formats list-valued properties.
pub fn parse_delimited_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| {
            item.trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Multiset difference between a desired and a remote element list:
/// `(added, removed)`. Order does not matter; duplicates do.
pub fn set_diff(desired: &[Value], remote: &[Value]) -> (Vec<Value>, Vec<Value>) {
    let mut remote_pool: Vec<Option<&Value>> = remote.iter().map(Some).collect();
    let mut added = Vec::new();
    for want in desired {
        match remote_pool
            .iter_mut()
            .find(|slot| slot.map(|v| v == want).unwrap_or(false))
        {
            Some(slot) => *slot = None,
            None => added.push(want.clone()),
        }
    }
    let removed = remote_pool.into_iter().flatten().cloned().collect();
    (added, removed)
}

/// Whether two element lists hold the same multiset.
pub fn sets_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let (added, removed) = set_diff(a, b);
    added.is_empty() && removed.is_empty()
}

/// Flatten a nested record value into `prefix.index.subfield` keys for
/// field-level diffing. Scalars map to their own prefix; arrays inject a
/// positional index segment.
pub fn flatten(prefix: &str, value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(prefix, value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{i}"), item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten_into(&format!("{prefix}.{key}"), item, out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

/// Read an integer attribute honouring the [`UNSET_INT`] sentinel.
/// `None`, null, and the sentinel all mean "unset".
pub fn sentinel_int(value: Option<&Value>) -> Result<Option<i64>, ServiceError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let n = n.as_i64().ok_or_else(|| {
                ServiceError::InvalidArgument(format!("expected an integer, got {n}"))
            })?;
            Ok(if n == UNSET_INT { None } else { Some(n) })
        }
        Some(other) => Err(ServiceError::InvalidArgument(format!(
            "expected an integer, got {other}"
        ))),
    }
}
