// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde_json::Value;
use std::sync::Arc;

use kres_common::state::State;

use crate::controller::lifecycle::{ControllerDefaults, LifecycleController};
use crate::controller::utils::create_k8s_client;
use crate::error::{ControllerError, Result};
use crate::kind::{KindDescriptor, KindRegistry};
use crate::store::{KubeObjectStore, ObjectStore};

// Context struct to hold the object store, the kind registry and the state
#[derive(Clone)]
pub struct Context<S = KubeObjectStore> {
    pub store: Arc<S>,
    pub registry: Arc<KindRegistry>,
    pub state: Arc<State>,
}

impl Context<KubeObjectStore> {
    /// Build a context against the cluster inferred from the environment
    ///
    /// # Arguments
    /// * `state`: The shared application state
    ///
    /// # Returns
    /// A Result containing the Context or an error if no client could be created
    pub async fn from_cluster(state: Arc<State>) -> Result<Self, ControllerError> {
        let client = create_k8s_client().await?;
        Ok(Context::new(KubeObjectStore::new(client), state))
    }
}

impl<S> Context<S>
where
    S: ObjectStore,
{
    pub fn new(store: S, state: Arc<State>) -> Self {
        Self {
            store: Arc::new(store),
            registry: Arc::new(KindRegistry::builtin()),
            state,
        }
    }

    pub fn with_registry(mut self, registry: KindRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn defaults(&self) -> ControllerDefaults {
        ControllerDefaults::from(&self.state.config.provider)
    }

    /// Controller for `kind` sharing this context's store and defaults
    ///
    /// # Arguments
    /// * `kind`: The kind the controller manages
    ///
    /// # Returns
    /// A LifecycleController backed by the shared store
    pub fn controller(&self, kind: KindDescriptor) -> LifecycleController<Arc<S>> {
        LifecycleController::new(self.store.clone(), kind, self.defaults())
    }

    /// Controller for the kind named by a manifest's `apiVersion` and `kind`
    ///
    /// # Arguments
    /// * `manifest`: The desired object
    ///
    /// # Returns
    /// A Result containing the controller or an error if the manifest has no type
    pub fn controller_for(&self, manifest: &Value) -> Result<LifecycleController<Arc<S>>, ControllerError> {
        let kind = self.kind_of(manifest)?;
        Ok(self.controller(kind))
    }

    /// Controller for a command line kind reference
    ///
    /// # Arguments
    /// * `reference`: A kind or plural name, optionally prefixed by `group/version/`
    ///
    /// # Returns
    /// A Result containing the controller or an error if no registered kind matches
    pub fn controller_named(&self, reference: &str) -> Result<LifecycleController<Arc<S>>, ControllerError> {
        let kind = self
            .registry
            .find(reference)
            .ok_or_else(|| ControllerError::UnknownKind(reference.to_string()))?;
        Ok(self.controller(kind))
    }

    pub fn kind_of(&self, manifest: &Value) -> Result<KindDescriptor, ControllerError> {
        let (api_version, kind) = KindDescriptor::type_meta(manifest).ok_or_else(|| {
            ControllerError::InvalidArguments("manifest must set apiVersion and kind".to_string())
        })?;
        Ok(self.registry.resolve(api_version, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use kres_common::config::AppConfig;

    use crate::kind::Scope;
    use crate::store::MemoryStore;

    fn context() -> Context<MemoryStore> {
        let mut config = AppConfig::default();
        config.provider.field_manager = "ops".to_string();
        Context::new(MemoryStore::new(), Arc::new(State { config }))
    }

    #[test]
    fn controllers_take_defaults_from_config() {
        let ctx = context();
        assert_eq!(ctx.defaults(), ControllerDefaults { field_manager: "ops".to_string(), force_conflicts: false });
        assert!(ctx.controller_named("deploy").is_err());
        assert_eq!(ctx.controller_named("Deployment").unwrap().defaults().field_manager, "ops");
    }

    #[test]
    fn resolves_manifest_kinds() {
        let ctx = context();
        let namespace = ctx.kind_of(&json!({"apiVersion": "v1", "kind": "Namespace"})).unwrap();
        assert_eq!(namespace.scope, Scope::Cluster);

        let widget = ctx.kind_of(&json!({"apiVersion": "example.com/v1", "kind": "Widget"})).unwrap();
        assert_eq!(widget.plural, "widgets");
        assert_eq!(widget.scope, Scope::Namespaced);

        assert!(matches!(
            ctx.kind_of(&json!({"kind": "Widget"})),
            Err(ControllerError::InvalidArguments(_))
        ));
    }
}
