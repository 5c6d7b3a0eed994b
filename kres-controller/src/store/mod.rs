// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod cluster;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::error::BoxError;
use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;

pub use self::cluster::KubeObjectStore;
pub use self::memory::MemoryStore;

/// Failure reported by an object store, distinguishing the statuses the
/// lifecycle controller treats specially
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error(transparent)]
    Transport(BoxError),
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn transport(error: impl Into<BoxError>) -> Self {
        StoreError::Transport(error.into())
    }
}

/// Resolved server-side apply parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyParams {
    pub field_manager: String,
    pub force: bool,
}

/// The remote object store the lifecycle controller drives
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<Value, StoreError>;

    /// Server-side apply `desired` with strict field validation
    async fn apply_patch(
        &self,
        kind: &KindDescriptor,
        id: &ResourceIdentity,
        desired: &Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError>;

    async fn delete(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ObjectStore for Arc<S>
where
    S: ObjectStore + ?Sized,
{
    async fn get(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<Value, StoreError> {
        (**self).get(kind, id).await
    }

    async fn apply_patch(
        &self,
        kind: &KindDescriptor,
        id: &ResourceIdentity,
        desired: &Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError> {
        (**self).apply_patch(kind, id, desired, params).await
    }

    async fn delete(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<(), StoreError> {
        (**self).delete(kind, id).await
    }
}
