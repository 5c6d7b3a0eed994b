// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::Serialize;
use serde_json::Value;

use crate::identity::ResourceIdentity;

/// Fields populated by the server that are not part of an object's state
const NOISY_METADATA: &[&str] = &["managedFields"];

/// A document returned by the object store after a get or an apply
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct RemoteDocument(Value);

impl RemoteDocument {
    /// Accept a raw response as a document. It must be a JSON object
    /// carrying `metadata.name`.
    pub fn decode(value: Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!("expected an object, found {}", type_name(&value)));
        }
        match value.pointer("/metadata/name") {
            Some(Value::String(name)) if !name.is_empty() => Ok(RemoteDocument(value)),
            Some(_) => Err("metadata.name is not a non-empty string".to_string()),
            None => Err("metadata.name is missing".to_string()),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::new(self.namespace().unwrap_or_default(), self.name())
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata_str("uid")
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    pub fn is_terminating(&self) -> bool {
        self.0.pointer("/metadata/deletionTimestamp").is_some()
    }

    /// The document with server bookkeeping removed, suitable for storing as
    /// local state
    pub fn normalized(&self) -> Value {
        let mut value = self.0.clone();
        if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            for key in NOISY_METADATA {
                metadata.remove(*key);
            }
        }
        value
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.0.get("metadata")?.get(key)?.as_str()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_requires_object_with_name() {
        assert!(RemoteDocument::decode(json!([1, 2])).unwrap_err().contains("an array"));
        assert!(RemoteDocument::decode(json!({"metadata": {}})).unwrap_err().contains("missing"));
        assert!(RemoteDocument::decode(json!({"metadata": {"name": 3}})).is_err());

        let document = RemoteDocument::decode(json!({
            "metadata": {"name": "web", "namespace": "prod", "uid": "u-1", "resourceVersion": "7"}
        })).unwrap();
        assert_eq!(document.identity(), ResourceIdentity::new("prod", "web"));
        assert_eq!(document.uid(), Some("u-1"));
        assert_eq!(document.resource_version(), Some("7"));
        assert!(!document.is_terminating());
    }

    #[test]
    fn normalized_strips_managed_fields_only() {
        let document = RemoteDocument::decode(json!({
            "metadata": {
                "name": "web",
                "resourceVersion": "7",
                "managedFields": [{"manager": "kres"}]
            },
            "status": {"ready": true}
        })).unwrap();

        let normalized = document.normalized();
        assert!(normalized.pointer("/metadata/managedFields").is_none());
        assert_eq!(normalized.pointer("/metadata/resourceVersion"), Some(&json!("7")));
        assert_eq!(normalized.pointer("/status/ready"), Some(&json!(true)));
        assert!(document.as_value().pointer("/metadata/managedFields").is_some());
    }
}
