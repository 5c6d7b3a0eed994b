// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use crate::kind::{KindDescriptor, Scope, split_api_version};

use Scope::{Cluster, Namespaced};

// (group, version, kind, plural, scope)
static BUILTIN_KINDS: &[(&str, &str, &str, &str, Scope)] = &[
    ("", "v1", "ConfigMap", "configmaps", Namespaced),
    ("", "v1", "Endpoints", "endpoints", Namespaced),
    ("", "v1", "LimitRange", "limitranges", Namespaced),
    ("", "v1", "Namespace", "namespaces", Cluster),
    ("", "v1", "PersistentVolume", "persistentvolumes", Cluster),
    ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims", Namespaced),
    ("", "v1", "Pod", "pods", Namespaced),
    ("", "v1", "ReplicationController", "replicationcontrollers", Namespaced),
    ("", "v1", "ResourceQuota", "resourcequotas", Namespaced),
    ("", "v1", "Secret", "secrets", Namespaced),
    ("", "v1", "Service", "services", Namespaced),
    ("", "v1", "ServiceAccount", "serviceaccounts", Namespaced),
    ("apps", "v1", "DaemonSet", "daemonsets", Namespaced),
    ("apps", "v1", "Deployment", "deployments", Namespaced),
    ("apps", "v1", "ReplicaSet", "replicasets", Namespaced),
    ("apps", "v1", "StatefulSet", "statefulsets", Namespaced),
    ("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers", Namespaced),
    ("batch", "v1", "CronJob", "cronjobs", Namespaced),
    ("batch", "v1", "Job", "jobs", Namespaced),
    ("coordination.k8s.io", "v1", "Lease", "leases", Namespaced),
    ("networking.k8s.io", "v1", "Ingress", "ingresses", Namespaced),
    ("networking.k8s.io", "v1", "IngressClass", "ingressclasses", Cluster),
    ("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies", Namespaced),
    ("policy", "v1", "PodDisruptionBudget", "poddisruptionbudgets", Namespaced),
    ("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles", Cluster),
    ("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings", Cluster),
    ("rbac.authorization.k8s.io", "v1", "Role", "roles", Namespaced),
    ("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings", Namespaced),
    ("scheduling.k8s.io", "v1", "PriorityClass", "priorityclasses", Cluster),
    ("storage.k8s.io", "v1", "StorageClass", "storageclasses", Cluster),
    ("apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions", Cluster),
    ("admissionregistration.k8s.io", "v1", "MutatingWebhookConfiguration", "mutatingwebhookconfigurations", Cluster),
    ("admissionregistration.k8s.io", "v1", "ValidatingWebhookConfiguration", "validatingwebhookconfigurations", Cluster),
];

/// Table of known kind descriptors
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: Vec<KindDescriptor>,
}

impl KindRegistry {
    pub fn builtin() -> Self {
        KindRegistry {
            kinds: BUILTIN_KINDS
                .iter()
                .map(|(group, version, kind, plural, scope)| KindDescriptor::new(group, version, kind, plural, *scope))
                .collect(),
        }
    }

    /// Add a descriptor, replacing any existing entry for the same
    /// group/version/kind
    pub fn register(&mut self, descriptor: KindDescriptor) {
        let api_version = descriptor.api_version();
        self.kinds.retain(|known| !known.matches(&api_version, &descriptor.kind));
        self.kinds.push(descriptor);
    }

    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&KindDescriptor> {
        self.kinds.iter().find(|known| known.matches(api_version, kind))
    }

    /// Resolve a descriptor for a manifest's `apiVersion`/`kind`, falling back
    /// to an ad hoc namespaced descriptor for unknown kinds
    pub fn resolve(&self, api_version: &str, kind: &str) -> KindDescriptor {
        self.lookup(api_version, kind)
            .cloned()
            .unwrap_or_else(|| KindDescriptor::from_api_version(api_version, kind))
    }

    /// Find a kind from a command line reference: `Deployment`, `deployments`,
    /// `apps/v1/Deployment` or `v1/ConfigMap`
    pub fn find(&self, reference: &str) -> Option<KindDescriptor> {
        if let Some((api_version, kind)) = reference.rsplit_once('/') {
            let (_, version) = split_api_version(api_version);
            if version.is_empty() || kind.is_empty() {
                return None;
            }
            return Some(self.resolve(api_version, kind));
        }

        self.kinds
            .iter()
            .find(|known| known.kind.eq_ignore_ascii_case(reference) || known.plural.eq_ignore_ascii_case(reference))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.kinds.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_builtin_kinds_by_short_name() {
        let registry = KindRegistry::builtin();

        let deployment = registry.find("deployment").unwrap();
        assert_eq!(deployment.api_version(), "apps/v1");
        assert!(deployment.is_namespaced());

        let namespace = registry.find("namespaces").unwrap();
        assert_eq!(namespace.scope, Scope::Cluster);

        assert!(registry.find("Widget").is_none());
    }

    #[test]
    fn full_references_resolve_unknown_kinds() {
        let registry = KindRegistry::builtin();

        let role = registry.find("rbac.authorization.k8s.io/v1/ClusterRole").unwrap();
        assert_eq!(role.scope, Scope::Cluster);

        let widget = registry.find("example.com/v1/Widget").unwrap();
        assert_eq!(widget.plural, "widgets");
        assert_eq!(widget.scope, Scope::Namespaced);

        assert!(registry.find("/Widget").is_none());
    }

    #[test]
    fn register_replaces_existing_descriptor() {
        let mut registry = KindRegistry::builtin();
        let count = registry.iter().count();

        registry.register(KindDescriptor::new("example.com", "v1", "Widget", "widgetz", Scope::Cluster));
        registry.register(KindDescriptor::new("example.com", "v1", "Widget", "widgets", Scope::Cluster));

        assert_eq!(registry.iter().count(), count + 1);
        assert_eq!(registry.lookup("example.com/v1", "Widget").unwrap().plural, "widgets");
    }
}
