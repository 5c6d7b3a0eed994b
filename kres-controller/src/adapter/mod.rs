// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod lookup;
pub mod manager;
pub mod manifest;

use serde::Serialize;
use serde_json::Value;

use crate::document::RemoteDocument;

pub use self::lookup::Lookup;
pub use self::manager::{args_schema, ApplyPlan, DeleteWaitArgs, Manager, ManagerArgs, WaitForArgs};
pub use self::manifest::{ManifestRenderer, OutputFormat, RenderedManifest};

/// What a host records for an object after Read or Apply
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ObjectState {
    /// Display id, `name/namespace`
    pub id: String,
    pub document: Value,
}

impl From<&RemoteDocument> for ObjectState {
    fn from(document: &RemoteDocument) -> Self {
        ObjectState {
            id: document.identity().display_id(),
            document: document.normalized(),
        }
    }
}
