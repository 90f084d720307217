//! API response types.

use indexmap::IndexMap;
use serde::Serialize;

use crate::glm::entity::{Clock, EntityKey, Object, Properties};

/// Model overview returned by `GET /summary`.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    /// Total number of entities, nested objects included.
    pub entities: usize,
    /// Entity count per kind (`directive`, `module`, `clock`, ...).
    pub kinds: IndexMap<&'static str, usize>,
    /// Object count per object type, in first-seen order.
    pub object_types: IndexMap<String, usize>,
    /// Module names in write order.
    pub modules: Vec<String>,
    pub clock: Option<Clock>,
}

/// One object as exposed by the `/objects` endpoints.
#[derive(Debug, Serialize)]
pub struct ObjectRecord {
    pub key: EntityKey,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: Option<String>,
    pub properties: Properties,
}

impl ObjectRecord {
    pub fn new(key: EntityKey, object: &Object) -> Self {
        Self {
            key,
            type_name: object.type_name.clone(),
            name: object.name().map(str::to_string),
            properties: object.properties.clone(),
        }
    }
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_record_copies_identity() {
        let object = Object::new("meter").with("name", "m1").with("phases", "AN");
        let record = ObjectRecord::new(7, &object);

        assert_eq!(record.key, 7);
        assert_eq!(record.type_name, "meter");
        assert_eq!(record.name.as_deref(), Some("m1"));
        assert_eq!(record.properties.get("phases").map(String::as_str), Some("AN"));
    }

    #[test]
    fn object_record_serializes_type_field() {
        let record = ObjectRecord::new(0, &Object::new("node"));
        let json = serde_json::to_value(&record).ok();
        assert_eq!(
            json.as_ref().and_then(|v| v.get("type")).and_then(|v| v.as_str()),
            Some("node")
        );
        assert!(json.as_ref().and_then(|v| v.get("name")).is_some_and(|v| v.is_null()));
    }
}
