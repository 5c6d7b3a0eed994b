// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use kres_common::utils::{compute_object_hash, sort_json};

use crate::error::ControllerError;
use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {:?}, expected yaml or json", other)),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest {
    /// blake3 hash of the rendered document
    pub id: String,
    pub text: String,
}

/// Produces the exact document sent on Apply for one kind
#[derive(Debug, Clone)]
pub struct ManifestRenderer {
    kind: KindDescriptor,
}

impl ManifestRenderer {
    pub fn new(kind: KindDescriptor) -> Self {
        Self { kind }
    }

    /// Stamp `apiVersion`, `kind` and the identity onto `desired`.
    ///
    /// A manifest that names a different kind or identity is rejected rather
    /// than silently retargeted.
    pub fn document(&self, id: &ResourceIdentity, desired: &Value) -> Result<Value, ControllerError> {
        let mut document = desired
            .as_object()
            .cloned()
            .ok_or_else(|| ControllerError::InvalidArguments("manifest must be an object".to_string()))?;

        if let Some((api_version, kind)) = KindDescriptor::type_meta(desired) {
            if !self.kind.matches(api_version, kind) {
                return Err(ControllerError::InvalidArguments(format!(
                    "manifest is a {}/{}, expected {}",
                    api_version, kind, self.kind
                )));
            }
        }
        document.insert("apiVersion".to_string(), Value::String(self.kind.api_version()));
        document.insert("kind".to_string(), Value::String(self.kind.kind.clone()));

        let metadata = document
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| ControllerError::InvalidArguments("metadata must be an object".to_string()))?;

        let mut checked = vec![("name", id.name.as_str())];
        // Cluster scoped objects drop whatever namespace the manifest carries
        if !id.is_cluster_scoped() {
            checked.push(("namespace", id.namespace.as_str()));
        }
        for (key, expected) in checked {
            match metadata.get(key).and_then(Value::as_str) {
                Some(found) if !found.is_empty() && found != expected => {
                    return Err(ControllerError::InvalidArguments(format!(
                        "metadata.{} is {:?}, expected {:?}",
                        key, found, expected
                    )));
                },
                _ => {},
            }
        }
        metadata.insert("name".to_string(), Value::String(id.name.clone()));
        if id.is_cluster_scoped() {
            metadata.remove("namespace");
        } else {
            metadata.insert("namespace".to_string(), Value::String(id.namespace.clone()));
        }

        Ok(Value::Object(document))
    }

    pub fn render(&self, id: &ResourceIdentity, desired: &Value, format: OutputFormat) -> Result<RenderedManifest, ControllerError> {
        let document = sort_json(self.document(id, desired)?);
        let rendered_id = compute_object_hash(&document).map_err(|e| ControllerError::RenderError(e.to_string()))?;
        let text = match format {
            OutputFormat::Yaml => serde_norway::to_string(&document).map_err(|e| ControllerError::RenderError(e.to_string()))?,
            OutputFormat::Json => serde_json::to_string_pretty(&document).map_err(|e| ControllerError::RenderError(e.to_string()))?,
        };

        Ok(RenderedManifest { id: rendered_id, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::kind::KindRegistry;

    fn config_maps() -> ManifestRenderer {
        ManifestRenderer::new(KindRegistry::builtin().resolve("v1", "ConfigMap"))
    }

    #[test]
    fn stamps_type_and_identity() {
        let document = config_maps()
            .document(&ResourceIdentity::new("apps", "settings"), &json!({"data": {"mode": "fast"}}))
            .unwrap();

        assert_eq!(document, json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "apps"},
            "data": {"mode": "fast"},
        }));
    }

    #[test]
    fn drops_namespace_for_cluster_scoped_kinds() {
        let renderer = ManifestRenderer::new(KindRegistry::builtin().resolve("v1", "Namespace"));
        let document = renderer
            .document(&ResourceIdentity::cluster("team-a"), &json!({"metadata": {"labels": {"team": "a"}}}))
            .unwrap();

        assert_eq!(document["metadata"], json!({"name": "team-a", "labels": {"team": "a"}}));
    }

    #[test]
    fn rejects_mismatched_manifests() {
        let renderer = config_maps();
        let id = ResourceIdentity::new("apps", "settings");

        assert!(renderer.document(&id, &json!("text")).is_err());
        assert!(renderer.document(&id, &json!({"apiVersion": "v1", "kind": "Secret"})).is_err());
        assert!(renderer.document(&id, &json!({"metadata": {"name": "other"}})).is_err());
        assert!(renderer.document(&id, &json!({"metadata": {"namespace": "kube-system"}})).is_err());
    }

    #[test]
    fn rendering_is_independent_of_key_order() {
        let renderer = config_maps();
        let id = ResourceIdentity::new("apps", "settings");

        let a = renderer.render(&id, &json!({"data": {"b": "2", "a": "1"}}), OutputFormat::Yaml).unwrap();
        let b = renderer.render(&id, &json!({"data": {"a": "1", "b": "2"}}), OutputFormat::Yaml).unwrap();
        assert_eq!(a, b);
        assert!(a.text.starts_with("apiVersion: v1\n"));

        let json = renderer.render(&id, &json!({"data": {"a": "1"}}), OutputFormat::Json).unwrap();
        let parsed: Value = serde_json::from_str(&json.text).unwrap();
        assert_eq!(parsed["metadata"]["name"], "settings");
    }

    #[test]
    fn parses_output_formats() {
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("toml".parse::<OutputFormat>().is_err());
    }
}
