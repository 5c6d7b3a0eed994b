// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use async_trait::async_trait;
use either::Either;
use kube::{
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams},
    Client,
};
use serde_json::Value;

use kres_common::telemetry::debug;

use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;
use crate::store::{ApplyParams, ObjectStore, StoreError};

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound {
                message: response.message.clone(),
            },
            kube::Error::Api(ref response) if response.code == 409 => StoreError::Conflict {
                message: response.message.clone(),
            },
            kube::Error::SerdeError(error) => StoreError::Decode(error),
            other => StoreError::transport(other),
        }
    }
}

/// Object store backed by the Kubernetes API through dynamic objects
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        if kind.is_namespaced() {
            Api::namespaced_with(self.client.clone(), &id.namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        }
    }
}

/// Server-side apply parameters with strict field validation
///
/// # Arguments
/// * `params`: The resolved field manager and force flag
///
/// # Returns
/// PatchParams for `Patch::Apply`, forcing ownership only when requested
pub fn apply_params(params: &ApplyParams) -> PatchParams {
    let patch_params = PatchParams::apply(&params.field_manager).validation_strict();
    if params.force {
        patch_params.force()
    } else {
        patch_params
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<Value, StoreError> {
        let object = self.api(kind, id).get(&id.name).await?;
        Ok(serde_json::to_value(object)?)
    }

    async fn apply_patch(
        &self,
        kind: &KindDescriptor,
        id: &ResourceIdentity,
        desired: &Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError> {
        let object = self
            .api(kind, id)
            .patch(&id.name, &apply_params(params), &Patch::Apply(desired))
            .await?;
        Ok(serde_json::to_value(object)?)
    }

    async fn delete(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<(), StoreError> {
        match self.api(kind, id).delete(&id.name, &DeleteParams::default()).await? {
            // Object still exists, typically held by finalizers
            Either::Left(_) => debug!(event = "DeletionPending", kind = %kind, id = %id),
            Either::Right(_) => debug!(event = "Deleted", kind = %kind, id = %id),
        }
        Ok(())
    }
}
