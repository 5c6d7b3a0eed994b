// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{LifecycleError, Result};

pub const ID_SEPARATOR: char = '/';

/// Layout of the display id recorded as local state after Read and Apply.
pub const DISPLAY_ID_FORMAT: &str = "<name>/<namespace>";

/// Layout of the token accepted by Import. Note that it is the reverse of
/// `DISPLAY_ID_FORMAT`; existing state files depend on both layouts.
pub const IMPORT_TOKEN_FORMAT: &str = "<namespace>/<name>";

/// Namespace and name of an object. Cluster scoped objects have an empty
/// namespace.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceIdentity {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        ResourceIdentity::new(String::new(), name)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// `name/namespace`, or just `name` for cluster scoped objects
    pub fn display_id(&self) -> String {
        if self.is_cluster_scoped() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.name, ID_SEPARATOR, self.namespace)
        }
    }

    /// `namespace/name`, or just `name` for cluster scoped objects
    pub fn import_token(&self) -> String {
        if self.is_cluster_scoped() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.namespace, ID_SEPARATOR, self.name)
        }
    }

    /// Parse an import token for a namespaced kind. The token must hold
    /// exactly two non-empty segments, namespace first.
    pub fn from_import_token(token: &str) -> Result<Self> {
        let invalid = |reason| LifecycleError::InvalidImportToken { token: token.to_string(), reason };

        let mut segments = token.split(ID_SEPARATOR);
        let (namespace, name) = match (segments.next(), segments.next(), segments.next()) {
            (Some(namespace), Some(name), None) => (namespace, name),
            (_, None, _) => return Err(invalid("expected <namespace>/<name>, found no separator")),
            _ => return Err(invalid("expected <namespace>/<name>, found more than one separator")),
        };

        if namespace.is_empty() {
            return Err(invalid("namespace segment is empty"));
        }
        if name.is_empty() {
            return Err(invalid("name segment is empty"));
        }

        Ok(ResourceIdentity::new(namespace, name))
    }

    /// Parse an import token for a cluster scoped kind: a bare name
    pub fn from_cluster_import_token(token: &str) -> Result<Self> {
        let invalid = |reason| LifecycleError::InvalidImportToken { token: token.to_string(), reason };

        if token.is_empty() {
            return Err(invalid("name is empty"));
        }
        if token.contains(ID_SEPARATOR) {
            return Err(invalid("expected <name> for a cluster scoped kind, found a separator"));
        }

        Ok(ResourceIdentity::cluster(token))
    }
}

impl Display for ResourceIdentity {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(&self.display_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn display_id_and_import_token_are_reversed() {
        let identity = ResourceIdentity::new("prod", "web");
        assert_eq!(identity.display_id(), "web/prod");
        assert_eq!(identity.import_token(), "prod/web");
    }

    #[test]
    fn cluster_scoped_ids_are_bare_names() {
        let identity = ResourceIdentity::cluster("admin");
        assert_eq!(identity.display_id(), "admin");
        assert_eq!(identity.import_token(), "admin");
        assert_eq!(ResourceIdentity::from_cluster_import_token("admin").unwrap(), identity);
    }

    #[rstest]
    #[case("prod", "web")]
    #[case("kube-system", "coredns")]
    #[case("a", "b")]
    #[case("ns.with.dots", "name-with-dashes")]
    fn import_token_round_trips(#[case] namespace: &str, #[case] name: &str) {
        let identity = ResourceIdentity::new(namespace, name);
        let parsed = ResourceIdentity::from_import_token(&identity.import_token()).unwrap();
        assert_eq!(parsed, identity);
        assert_eq!(ResourceIdentity::from_import_token(&format!("{namespace}/{name}")).unwrap(), identity);
    }

    #[rstest]
    #[case("")]
    #[case("web")]
    #[case("/")]
    #[case("/web")]
    #[case("prod/")]
    #[case("prod/web/extra")]
    #[case("a//b")]
    #[case("//")]
    fn malformed_import_tokens_are_rejected(#[case] token: &str) {
        match ResourceIdentity::from_import_token(token) {
            Err(LifecycleError::InvalidImportToken { token: echoed, .. }) => assert_eq!(echoed, token),
            other => panic!("expected InvalidImportToken for {token:?}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("")]
    #[case("prod/admin")]
    fn malformed_cluster_tokens_are_rejected(#[case] token: &str) {
        assert!(matches!(
            ResourceIdentity::from_cluster_import_token(token),
            Err(LifecycleError::InvalidImportToken { .. })
        ));
    }
}
