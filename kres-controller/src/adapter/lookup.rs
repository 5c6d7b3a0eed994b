// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use crate::adapter::ObjectState;
use crate::controller::lifecycle::LifecycleController;
use crate::error::Result;
use crate::identity::ResourceIdentity;
use crate::store::ObjectStore;

/// Read-only view of existing objects of one kind
pub struct Lookup<S> {
    controller: LifecycleController<S>,
}

impl<S> Lookup<S>
where
    S: ObjectStore,
{
    pub fn new(controller: LifecycleController<S>) -> Self {
        Self { controller }
    }

    /// Fails with `NotFound` when the object does not exist
    pub async fn read(&self, id: &ResourceIdentity) -> Result<ObjectState> {
        let document = self.controller.read(id).await?;
        Ok(ObjectState::from(&document))
    }
}
