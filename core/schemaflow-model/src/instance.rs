use schemaflow_types::{ContainerId, InstanceId, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored content item bound to exactly one container version.
///
/// `fields` maps field names to JSON values typed according to the bound
/// version's definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInstance {
    pub id: InstanceId,
    pub container: ContainerId,
    pub version: VersionId,
    pub fields: Map<String, Value>,
    pub created_at: i64,
    pub modified_at: i64,
}

impl ContentInstance {
    /// Creates an instance bound to `version` with the current time.
    pub fn new(container: ContainerId, version: VersionId, fields: Map<String, Value>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: InstanceId::new(),
            container,
            version,
            fields,
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns the raw value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Extracts a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    /// Extracts a boolean field.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(|v| v.as_bool())
    }

    /// Extracts a numeric field.
    pub fn get_number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(|v| v.as_f64())
    }
}
