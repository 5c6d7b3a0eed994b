// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod registry;

use kube::core::ApiResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

pub use registry::KindRegistry;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Namespaced,
    Cluster,
}

/// Everything the lifecycle controller needs to know about an object kind.
/// Descriptors are plain data; there is no per-kind code.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub scope: Scope,
}

impl KindDescriptor {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, scope: Scope) -> Self {
        KindDescriptor {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            scope,
        }
    }

    /// Describe a kind that is not in the registry from its `apiVersion` and
    /// `kind`. The plural is guessed and the kind is assumed to be namespaced.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        KindDescriptor {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: guess_plural(kind),
            scope: Scope::Namespaced,
        }
    }

    /// Read `apiVersion` and `kind` from a manifest
    pub fn type_meta(document: &Value) -> Option<(&str, &str)> {
        let api_version = document.get("apiVersion")?.as_str()?;
        let kind = document.get("kind")?.as_str()?;
        Some((api_version, kind))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }

    pub fn matches(&self, api_version: &str, kind: &str) -> bool {
        let (group, version) = split_api_version(api_version);
        self.group == group && self.version == version && self.kind == kind
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl Display for KindDescriptor {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Split `apps/v1` into (`apps`, `v1`); core `v1` has an empty group
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

fn guess_plural(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") && !lower.ends_with("oy") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else {
        format!("{}s", lower)
    }
}
