//! Typed property bag.
//!
//! Every property bag on a request (resource, system, request, deployment
//! location) is a mapping from name to a tagged [`PropertyValue`] rather than
//! an untyped JSON blob, so [`crate::render_context`] and
//! [`crate::key_property_processor`] can discriminate `key` entries
//! statically instead of probing a dynamic map at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{keyName, privateKey, publicKey}` — the payload of a `key`-typed property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    #[serde(rename = "keyName")]
    pub key_name: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "publicKey", default)]
    pub public_key: String,
}

/// One entry of a property bag, tagged by `type`.
///
/// The wire shape is `{"type": "<name>", "value": <json>}`. The eight
/// well-known type names deserialize into their dedicated variant; any other
/// `type_name` is carried opaquely as [`PropertyValue::UserType`] so
/// rendering can still stringify it via `serde_json`.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Parsed as RFC 3339 on the way in so a malformed `timestamp` property
    /// is rejected at the request boundary rather than silently carried as
    /// an opaque string through to the template scope.
    Timestamp(DateTime<Utc>),
    Map(BTreeMap<String, PropertyValue>),
    List(Vec<PropertyValue>),
    Key(KeyMaterial),
    UserType { type_name: String, value: serde_json::Value },
}

#[derive(Serialize, Deserialize)]
struct WireProperty {
    #[serde(rename = "type")]
    type_name: String,
    value: serde_json::Value,
}

impl Serialize for PropertyValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (type_name, value) = match self {
            PropertyValue::String(s) => ("string", serde_json::Value::String(s.clone())),
            PropertyValue::Integer(i) => ("integer", serde_json::json!(i)),
            PropertyValue::Float(f) => ("float", serde_json::json!(f)),
            PropertyValue::Boolean(b) => ("boolean", serde_json::json!(b)),
            PropertyValue::Timestamp(t) => ("timestamp", serde_json::Value::String(t.to_rfc3339())),
            PropertyValue::Map(_) | PropertyValue::List(_) | PropertyValue::Key(_) => {
                (self.type_name(), self.to_json())
            }
            PropertyValue::UserType { type_name, value } => (type_name.as_str(), value.clone()),
        };

        WireProperty {
            type_name: type_name.to_string(),
            value,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let wire = WireProperty::deserialize(deserializer)?;
        Ok(match wire.type_name.as_str() {
            "string" => PropertyValue::String(wire.value.as_str().unwrap_or_default().to_string()),
            "integer" => PropertyValue::Integer(wire.value.as_i64().ok_or_else(|| Error::custom("integer value is not an integer"))?),
            "float" => PropertyValue::Float(wire.value.as_f64().ok_or_else(|| Error::custom("float value is not a number"))?),
            "boolean" => PropertyValue::Boolean(wire.value.as_bool().ok_or_else(|| Error::custom("boolean value is not a bool"))?),
            "timestamp" => {
                let raw = wire.value.as_str().ok_or_else(|| Error::custom("timestamp value is not a string"))?;
                let parsed = DateTime::parse_from_rfc3339(raw).map_err(Error::custom)?;
                PropertyValue::Timestamp(parsed.with_timezone(&Utc))
            }
            "map" => PropertyValue::Map(serde_json::from_value(wire.value).map_err(Error::custom)?),
            "list" => PropertyValue::List(serde_json::from_value(wire.value).map_err(Error::custom)?),
            "key" => PropertyValue::Key(serde_json::from_value(wire.value).map_err(Error::custom)?),
            other => PropertyValue::UserType {
                type_name: other.to_string(),
                value: wire.value,
            },
        })
    }
}

impl PropertyValue {
    fn type_name(&self) -> &str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Timestamp(_) => "timestamp",
            PropertyValue::Map(_) => "map",
            PropertyValue::List(_) => "list",
            PropertyValue::Key(_) => "key",
            PropertyValue::UserType { type_name, .. } => type_name.as_str(),
        }
    }

    pub fn as_key(&self) -> Option<&KeyMaterial> {
        match self {
            PropertyValue::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Renders the value the way the template scope sees it: scalars as
    /// themselves, `key` entries as `{keyName, publicKey, privateKey}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Integer(i) => serde_json::json!(i),
            PropertyValue::Float(f) => serde_json::json!(f),
            PropertyValue::Boolean(b) => serde_json::json!(b),
            PropertyValue::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            PropertyValue::Map(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            PropertyValue::List(l) => serde_json::Value::Array(l.iter().map(|v| v.to_json()).collect()),
            PropertyValue::Key(k) => serde_json::json!({
                "keyName": k.key_name,
                "publicKey": k.public_key,
                "privateKey": k.private_key,
            }),
            PropertyValue::UserType { value, .. } => value.clone(),
        }
    }
}

/// Ordered by name so iteration (and the key-materialisation pass) is
/// deterministic across runs.
pub type PropertyBag = BTreeMap<String, PropertyValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_renders_as_object() {
        let key = PropertyValue::Key(KeyMaterial {
            key_name: "deploy".to_string(),
            private_key: "PRIV".to_string(),
            public_key: "PUB".to_string(),
        });

        let json = key.to_json();
        assert_eq!(json["keyName"], "deploy");
        assert_eq!(json["privateKey"], "PRIV");
    }

    #[test]
    fn deserializes_string_and_integer() {
        let v: PropertyValue = serde_json::from_value(serde_json::json!({"type": "string", "value": "hi"})).unwrap();
        assert_eq!(v, PropertyValue::String("hi".to_string()));

        let v: PropertyValue = serde_json::from_value(serde_json::json!({"type": "integer", "value": 42})).unwrap();
        assert_eq!(v, PropertyValue::Integer(42));
    }

    #[test]
    fn timestamp_round_trips_through_rfc3339() {
        let v: PropertyValue =
            serde_json::from_value(serde_json::json!({"type": "timestamp", "value": "2024-03-01T12:00:00Z"})).unwrap();
        assert!(matches!(v, PropertyValue::Timestamp(_)));
        assert_eq!(v.to_json(), serde_json::Value::String("2024-03-01T12:00:00+00:00".to_string()));
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let err = serde_json::from_value::<PropertyValue>(serde_json::json!({"type": "timestamp", "value": "not-a-date"}));
        assert!(err.is_err());
    }
}
