//! Entity and primary key traits.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

/// A primary key for an entity kind.
///
/// The backend identifies records either by a numeric id (`zone.id`) or by a
/// string id (`machine.system_id`). Keys must round-trip through their
/// `Display`/`FromStr` forms so they can be typed on a command line.
pub trait PrimaryKey:
    Clone + Eq + Hash + Ord + Debug + Display + FromStr + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Render the key as a JSON value for request params.
    fn to_json(&self) -> JsonValue;

    /// Read a key back out of a JSON value (push notifications carry bare keys).
    fn from_json(value: &JsonValue) -> Option<Self>;
}

impl PrimaryKey for u64 {
    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }

    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl PrimaryKey for String {
    fn to_json(&self) -> JsonValue {
        JsonValue::String(self.clone())
    }

    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A record held in a synchronized collection.
///
/// Implementations are usually generated by the console's `impl_entity!`
/// macro; the payload beyond the key is opaque to the store.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key type.
    type Key: PrimaryKey;

    /// Backend model name used in request methods (e.g. "machine").
    const MODEL: &'static str;

    /// Name of the primary key field (e.g. "id", "system_id").
    const PK_FIELD: &'static str;

    /// The primary key of this record.
    fn key(&self) -> Self::Key;

    /// Extract the key from a raw payload without decoding the whole record.
    fn key_from_json(value: &JsonValue) -> Option<Self::Key> {
        match value {
            JsonValue::Object(map) => map.get(Self::PK_FIELD).and_then(Self::Key::from_json),
            other => Self::Key::from_json(other),
        }
    }

    /// Request params that address a single record: `{PK_FIELD: key}`.
    fn key_params(key: &Self::Key) -> JsonValue {
        let mut params = serde_json::Map::new();
        params.insert(Self::PK_FIELD.to_string(), key.to_json());
        JsonValue::Object(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Node {
        system_id: String,
        hostname: String,
    }

    impl Entity for Node {
        type Key = String;
        const MODEL: &'static str = "node";
        const PK_FIELD: &'static str = "system_id";

        fn key(&self) -> String {
            self.system_id.clone()
        }
    }

    #[test]
    fn test_numeric_key_accepts_string_form() {
        assert_eq!(u64::from_json(&json!(42)), Some(42));
        assert_eq!(u64::from_json(&json!("42")), Some(42));
        assert_eq!(u64::from_json(&json!("abc")), None);
        assert_eq!(u64::from_json(&json!(null)), None);
    }

    #[test]
    fn test_key_from_object_payload() {
        let payload = json!({"system_id": "abc123", "hostname": "node-1"});
        assert_eq!(Node::key_from_json(&payload), Some("abc123".to_string()));
    }

    #[test]
    fn test_key_from_bare_payload() {
        assert_eq!(Node::key_from_json(&json!("abc123")), Some("abc123".to_string()));
    }

    #[test]
    fn test_key_params() {
        assert_eq!(
            Node::key_params(&"abc123".to_string()),
            json!({"system_id": "abc123"})
        );
    }
}
