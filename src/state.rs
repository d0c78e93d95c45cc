//! The stored state record for one resource instance.
//!
//! A [`StateRecord`] is what the host persists between runs: the encoded
//! identifier, the declared attribute map, the last show/describe/parameter
//! snapshots, and the schema version the record was written at. The record
//! is created on first Create, rewritten on every Read, and destroyed on
//! Delete or when the remote reports the object gone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ShowRow;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::value::PropertyBag;

/// The raw, schema-version-agnostic form a state record is migrated in.
pub type RawState = Map<String, Value>;

/// Persistent state for one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// The object identifier, persisted in its pipe state encoding.
    #[serde(with = "id_encoding")]
    pub id: ObjectIdentifier,
    /// The resource type name this record belongs to.
    pub kind: String,
    /// Declared attribute values.
    pub attributes: Map<String, Value>,
    /// Last observed show row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_snapshot: Option<ShowRow>,
    /// Last observed describe property bag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub describe_snapshot: Option<PropertyBag>,
    /// Last observed object parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    /// The schema version this record was written at.
    pub schema_version: u64,
}

impl StateRecord {
    /// Create a fresh record with no snapshots.
    pub fn new(id: ObjectIdentifier, kind: impl Into<String>, schema_version: u64) -> Self {
        Self {
            id,
            kind: kind.into(),
            attributes: Map::new(),
            show_snapshot: None,
            describe_snapshot: None,
            parameters: BTreeMap::new(),
            schema_version,
        }
    }

    /// Read one attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Write one attribute value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Serialize into the raw map form the state migrator operates on.
    pub fn to_raw(&self) -> Result<RawState, ServiceError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ServiceError::Fatal(format!(
                "state record serialized to a non-object: {other}"
            ))),
        }
    }

    /// Rebuild a record from the raw map form.
    pub fn from_raw(raw: RawState) -> Result<Self, ServiceError> {
        Ok(serde_json::from_value(Value::Object(raw))?)
    }
}

mod id_encoding {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ident::ObjectIdentifier;

    pub fn serialize<S: Serializer>(
        id: &ObjectIdentifier,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_state_encoding())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<ObjectIdentifier, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        ObjectIdentifier::from_state_encoding(&encoded).map_err(serde::de::Error::custom)
    }
}
