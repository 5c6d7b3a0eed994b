// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use kres_common::config::ProviderConfig;
use kres_common::telemetry::info;

use crate::adapter::{ManifestRenderer, ObjectState, OutputFormat, RenderedManifest};
use crate::controller::lifecycle::{ApplyOptions, DeleteWait, LifecycleController, WaitSpec, WaitTimeout};
use crate::error::{ApplyError, ControllerError, Result};
use crate::identity::ResourceIdentity;
use crate::store::ObjectStore;

/// Declarative arguments for managing one object
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ManagerArgs {
    /// The desired object. `apiVersion` and `kind` may be omitted.
    #[schemars(schema_with = "any_object_schema")]
    pub manifest: Value,
    #[serde(flatten)]
    pub options: ApplyOptions,
    /// Conditions to wait for after each apply, checked in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<WaitForArgs>,
    /// Wait for the object to disappear after a delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_wait: Option<DeleteWaitArgs>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct WaitForArgs {
    /// JSONPath into the live object, e.g. `$.status.phase`
    pub path: String,
    /// Expected value; when omitted the path only has to resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `0` checks once, a negative value waits up to a week
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<WaitTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub poll_interval: Option<Duration>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DeleteWaitArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<WaitTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub poll_interval: Option<Duration>,
}

fn any_object_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}

/// JSON schema of `ManagerArgs`, for hosts that validate arguments up front
pub fn args_schema() -> schemars::Schema {
    schemars::schema_for!(ManagerArgs)
}

/// Validated arguments, ready to drive the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyPlan {
    pub id: ResourceIdentity,
    pub desired: Value,
    pub options: ApplyOptions,
    pub waits: Vec<WaitSpec>,
    pub delete_wait: Option<DeleteWait>,
}

/// Create, update, read, delete and import objects of one kind from
/// declarative arguments
pub struct Manager<S> {
    controller: LifecycleController<S>,
    renderer: ManifestRenderer,
    provider: ProviderConfig,
}

impl<S> Manager<S>
where
    S: ObjectStore,
{
    pub fn new(controller: LifecycleController<S>, provider: ProviderConfig) -> Self {
        let renderer = ManifestRenderer::new(controller.kind().clone());
        Self { controller, renderer, provider }
    }

    pub fn controller(&self) -> &LifecycleController<S> {
        &self.controller
    }

    /// Validate `args` without touching the store. Namespaced objects without
    /// a namespace land in the configured default namespace.
    pub fn plan(&self, args: &ManagerArgs) -> Result<ApplyPlan, ControllerError> {
        let metadata = args.manifest.get("metadata");
        let name = metadata
            .and_then(|metadata| metadata.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ControllerError::InvalidArguments("manifest.metadata.name is required".to_string()))?;

        let id = if self.controller.kind().is_namespaced() {
            let namespace = metadata
                .and_then(|metadata| metadata.get("namespace"))
                .and_then(Value::as_str)
                .filter(|namespace| !namespace.is_empty())
                .unwrap_or(self.provider.default_namespace.as_str());
            ResourceIdentity::new(namespace, name)
        } else {
            ResourceIdentity::cluster(name)
        };

        let waits = args
            .wait_for
            .iter()
            .map(|wait| {
                WaitSpec::new(
                    &wait.path,
                    wait.value.as_deref(),
                    wait.timeout.unwrap_or_else(|| self.default_timeout()),
                    wait.poll_interval.unwrap_or(self.provider.default_poll_interval),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let delete_wait = args.delete_wait.as_ref().map(|wait| DeleteWait {
            timeout: wait.timeout.unwrap_or_else(|| self.default_timeout()),
            poll_interval: wait.poll_interval.unwrap_or(self.provider.default_poll_interval),
        });

        Ok(ApplyPlan {
            desired: self.renderer.document(&id, &args.manifest)?,
            id,
            options: args.options.clone(),
            waits,
            delete_wait,
        })
    }

    /// The document `create` would send, without sending it
    pub fn render(&self, plan: &ApplyPlan, format: OutputFormat) -> Result<RenderedManifest, ControllerError> {
        self.renderer.render(&plan.id, &plan.desired, format)
    }

    pub async fn create(&self, plan: &ApplyPlan) -> Result<ObjectState, ApplyError> {
        self.apply(plan).await
    }

    pub async fn update(&self, plan: &ApplyPlan) -> Result<ObjectState, ApplyError> {
        self.apply(plan).await
    }

    /// `Ok(None)` when the object is gone, so the host can drop its state
    pub async fn read(&self, id: &ResourceIdentity) -> Result<Option<ObjectState>> {
        match self.controller.read(id).await {
            Ok(document) => Ok(Some(ObjectState::from(&document))),
            Err(e) if e.is_not_found() => {
                info!(event = "Gone", kind = %self.controller.kind(), id = %id);
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, plan: &ApplyPlan) -> Result<()> {
        self.controller.delete(&plan.id, plan.delete_wait.as_ref()).await
    }

    /// Resolve an import token and read the object it names
    pub async fn import(&self, token: &str) -> Result<ObjectState> {
        let id = self.controller.import(token)?;
        let document = self.controller.read(&id).await?;
        Ok(ObjectState::from(&document))
    }

    async fn apply(&self, plan: &ApplyPlan) -> Result<ObjectState, ApplyError> {
        let document = self.controller.apply(&plan.id, &plan.desired, &plan.options, &plan.waits).await?;
        Ok(ObjectState::from(&document))
    }

    fn default_timeout(&self) -> WaitTimeout {
        WaitTimeout::from_duration(self.provider.default_wait_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::controller::lifecycle::ControllerDefaults;
    use crate::kind::KindRegistry;
    use crate::store::MemoryStore;

    fn manager(kind: &str) -> (Arc<MemoryStore>, Manager<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let kind = KindRegistry::builtin().find(kind).unwrap();
        let controller = LifecycleController::new(store.clone(), kind, ControllerDefaults::default());
        (store, Manager::new(controller, ProviderConfig::default()))
    }

    fn args(value: Value) -> ManagerArgs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn plans_fill_defaults() {
        let (_, manager) = manager("ConfigMap");
        let plan = manager
            .plan(&args(json!({
                "manifest": {"metadata": {"name": "settings"}, "data": {"mode": "fast"}},
                "field_manager": "ci",
                "wait_for": [{"path": "$.metadata.uid"}, {"path": "status.phase", "value": "Ready", "timeout": -1}],
                "delete_wait": {"timeout": "30s", "poll_interval": "2s"},
            })))
            .unwrap();

        assert_eq!(plan.id, ResourceIdentity::new("default", "settings"));
        assert_eq!(plan.desired["metadata"]["namespace"], "default");
        assert_eq!(plan.options.field_manager.as_deref(), Some("ci"));
        assert_eq!(plan.waits.len(), 2);
        assert_eq!(plan.waits[0].timeout, WaitTimeout::Within(Duration::from_secs(300)));
        assert_eq!(plan.waits[0].poll_interval, Duration::from_secs(1));
        assert_eq!(plan.waits[1].timeout, WaitTimeout::Indefinite);
        assert_eq!(plan.delete_wait, Some(DeleteWait {
            timeout: WaitTimeout::Within(Duration::from_secs(30)),
            poll_interval: Duration::from_secs(2),
        }));
    }

    #[test]
    fn plans_reject_bad_arguments() {
        let (_, manager) = manager("ConfigMap");

        let unnamed = manager.plan(&args(json!({"manifest": {"data": {}}})));
        assert!(matches!(unnamed, Err(ControllerError::InvalidArguments(_))));

        let bad_path = manager.plan(&args(json!({
            "manifest": {"metadata": {"name": "settings"}},
            "wait_for": [{"path": "$.status["}],
        })));
        assert!(matches!(bad_path, Err(ControllerError::InvalidCondition(_))));
    }

    #[tokio::test]
    async fn create_read_import_delete() {
        let (store, manager) = manager("ConfigMap");
        let plan = manager
            .plan(&args(json!({"manifest": {"metadata": {"name": "settings", "namespace": "apps"}, "data": {"a": "1"}}})))
            .unwrap();

        let created = manager.create(&plan).await.unwrap();
        assert_eq!(created.id, "settings/apps");
        assert!(store.contains(manager.controller().kind(), &plan.id));

        let changed = manager
            .plan(&args(json!({"manifest": {"metadata": {"name": "settings", "namespace": "apps"}, "data": {"a": "2"}}})))
            .unwrap();
        let updated = manager.update(&changed).await.unwrap();
        assert_eq!(updated.document["data"]["a"], "2");

        let imported = manager.import("apps/settings").await.unwrap();
        assert_eq!(imported, updated);

        manager.delete(&plan).await.unwrap();
        assert_eq!(manager.read(&plan.id).await.unwrap(), None);
    }

    #[test]
    fn renders_the_planned_document() {
        let (_, manager) = manager("Namespace");
        let plan = manager.plan(&args(json!({"manifest": {"metadata": {"name": "team-a", "namespace": "ignored"}}}))).unwrap();
        assert_eq!(plan.id, ResourceIdentity::cluster("team-a"));

        let rendered = manager.render(&plan, OutputFormat::Json).unwrap();
        let document: Value = serde_json::from_str(&rendered.text).unwrap();
        assert_eq!(document, json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "team-a"}}));
    }

    #[test]
    fn schema_describes_arguments() {
        let schema = serde_json::to_value(args_schema()).unwrap();
        let properties = &schema["properties"];
        for key in ["manifest", "field_manager", "force_conflicts", "wait_for", "delete_wait"] {
            assert!(properties.get(key).is_some(), "missing {}", key);
        }
    }
}
