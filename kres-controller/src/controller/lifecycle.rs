// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;
use schemars::JsonSchema;

use kres_common::config::ProviderConfig;
use kres_common::telemetry::{debug, error, info, instrument, warn};

use crate::condition::{evaluate, JsonPath, PathError};
use crate::document::RemoteDocument;
use crate::error::{ApplyError, LifecycleError, Operation, Result};
use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;
use crate::poll::{poll_until, Poll, PollError};
use crate::store::{ApplyParams, ObjectStore, StoreError};

/// Upper bound used when a wait is given a negative timeout
pub const INDEFINITE_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Defaults for apply options, fixed when the controller is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDefaults {
    pub field_manager: String,
    pub force_conflicts: bool,
}

impl From<&ProviderConfig> for ControllerDefaults {
    fn from(config: &ProviderConfig) -> Self {
        ControllerDefaults {
            field_manager: config.field_manager.clone(),
            force_conflicts: config.force_conflicts,
        }
    }
}

impl Default for ControllerDefaults {
    fn default() -> Self {
        ControllerDefaults::from(&ProviderConfig::default())
    }
}

/// Per-call apply options. `None` or an empty field manager means unset,
/// in which case the controller default applies.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ApplyOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_conflicts: Option<bool>,
}

impl ApplyOptions {
    pub fn resolve(&self, defaults: &ControllerDefaults) -> ApplyParams {
        ApplyParams {
            field_manager: self
                .field_manager
                .clone()
                .filter(|manager| !manager.is_empty())
                .unwrap_or_else(|| defaults.field_manager.clone()),
            force: self.force_conflicts.unwrap_or(defaults.force_conflicts),
        }
    }
}

/// How long a wait may take. Zero checks once, negative values wait for up
/// to `INDEFINITE_WAIT`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "RawTimeout", into = "String")]
pub enum WaitTimeout {
    Once,
    Within(Duration),
    Indefinite,
}

impl WaitTimeout {
    pub fn from_duration(duration: Duration) -> Self {
        if duration.is_zero() {
            WaitTimeout::Once
        } else {
            WaitTimeout::Within(duration)
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            WaitTimeout::Once => Duration::ZERO,
            WaitTimeout::Within(duration) => *duration,
            WaitTimeout::Indefinite => INDEFINITE_WAIT,
        }
    }
}

impl FromStr for WaitTimeout {
    type Err = String;

    /// Accepts humantime durations (`90s`, `5m`, `1h 30m`), plain seconds and
    /// a leading `-` for an indefinite wait
    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let text = text.trim();
        if text.starts_with('-') {
            return Ok(WaitTimeout::Indefinite);
        }
        if let Ok(seconds) = text.parse::<u64>() {
            return Ok(WaitTimeout::from_duration(Duration::from_secs(seconds)));
        }
        humantime::parse_duration(text)
            .map(WaitTimeout::from_duration)
            .map_err(|e| format!("invalid timeout {:?}: {}", text, e))
    }
}

impl Display for WaitTimeout {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            WaitTimeout::Once => f.write_str("0s"),
            WaitTimeout::Within(duration) => write!(f, "{}", humantime::format_duration(*duration)),
            WaitTimeout::Indefinite => f.write_str("-1"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeout {
    Seconds(i64),
    Text(String),
}

impl TryFrom<RawTimeout> for WaitTimeout {
    type Error = String;

    fn try_from(raw: RawTimeout) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawTimeout::Seconds(seconds) if seconds < 0 => Ok(WaitTimeout::Indefinite),
            RawTimeout::Seconds(seconds) => Ok(WaitTimeout::from_duration(Duration::from_secs(seconds.unsigned_abs()))),
            RawTimeout::Text(text) => text.parse(),
        }
    }
}

impl From<WaitTimeout> for String {
    fn from(timeout: WaitTimeout) -> Self {
        timeout.to_string()
    }
}

/// A condition on the live object polled after an apply
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    pub path: JsonPath,
    pub expected_value: Option<String>,
    pub timeout: WaitTimeout,
    pub poll_interval: Duration,
}

impl WaitSpec {
    pub fn new(path: &str, expected_value: Option<&str>, timeout: WaitTimeout, poll_interval: Duration) -> std::result::Result<Self, PathError> {
        Ok(WaitSpec {
            path: JsonPath::parse(path)?,
            expected_value: expected_value.map(str::to_string),
            timeout,
            poll_interval,
        })
    }

    fn describe(&self) -> String {
        match &self.expected_value {
            Some(expected) => format!("{} == {:?}", self.path, expected),
            None => format!("{} to be set", self.path),
        }
    }
}

/// Waiting for an object to disappear after a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteWait {
    pub timeout: WaitTimeout,
    pub poll_interval: Duration,
}

/// Drives Apply, Read, Delete and Import for one kind against an object
/// store. Holds no mutable state, so clones may be used concurrently for
/// different objects.
#[derive(Clone)]
pub struct LifecycleController<S> {
    store: S,
    kind: KindDescriptor,
    defaults: ControllerDefaults,
}

impl<S> LifecycleController<S>
where
    S: ObjectStore,
{
    pub fn new(store: S, kind: KindDescriptor, defaults: ControllerDefaults) -> Self {
        Self { store, kind, defaults }
    }

    pub fn kind(&self) -> &KindDescriptor {
        &self.kind
    }

    pub fn defaults(&self) -> &ControllerDefaults {
        &self.defaults
    }

    /// Server-side apply `desired`, then wait for each condition in order.
    ///
    /// A wait that does not resolve aborts the remaining waits; the object
    /// stays applied and the error carries the applied document.
    ///
    /// # Arguments
    /// * `id`: The identity of the object
    /// * `desired`: The full desired document, as produced by `ManifestRenderer`
    /// * `options`: Per-call apply options, unset fields take the controller defaults
    /// * `waits`: Conditions polled on the live object, in order
    ///
    /// # Returns
    /// A Result containing the apply response or an ApplyError
    #[instrument(skip_all, fields(kind = %self.kind, id = %id))]
    pub async fn apply(
        &self,
        id: &ResourceIdentity,
        desired: &Value,
        options: &ApplyOptions,
        waits: &[WaitSpec],
    ) -> Result<RemoteDocument, ApplyError> {
        let params = options.resolve(&self.defaults);
        info!(
            event = "Applying",
            field_manager = params.field_manager.as_str(),
            force_conflicts = params.force,
        );

        let response = self
            .store
            .apply_patch(&self.kind, id, desired, &params)
            .await
            .map_err(|e| self.store_error(Operation::Apply, id, e))?;
        let applied = self.decode(Operation::Apply, id, response)?;
        info!(
            event = "Applied",
            resource_version = applied.resource_version().unwrap_or_default(),
        );

        for wait in waits {
            if let Err(error) = self.wait_for(id, wait).await {
                warn!(event = "WaitFailed", condition = wait.describe().as_str(), error = %error);
                return Err(ApplyError::partial(error, applied));
            }
        }

        Ok(applied)
    }

    /// Fetch the live object
    #[instrument(skip_all, fields(kind = %self.kind, id = %id))]
    pub async fn read(&self, id: &ResourceIdentity) -> Result<RemoteDocument> {
        let response = self
            .store
            .get(&self.kind, id)
            .await
            .map_err(|e| self.store_error(Operation::Read, id, e))?;
        self.decode(Operation::Read, id, response)
    }

    /// Delete the object. A missing object counts as deleted. With a wait,
    /// poll until the object is gone.
    ///
    /// # Arguments
    /// * `id`: The identity of the object
    /// * `wait`: How long to wait for removal, `None` returns once the delete is accepted
    #[instrument(skip_all, fields(kind = %self.kind, id = %id))]
    pub async fn delete(&self, id: &ResourceIdentity, wait: Option<&DeleteWait>) -> Result<()> {
        match self.store.delete(&self.kind, id).await {
            Ok(()) => info!(event = "Deleted"),
            Err(StoreError::NotFound { .. }) => info!(event = "AlreadyDeleted"),
            Err(e) => return Err(self.store_error(Operation::Delete, id, e)),
        }

        let Some(wait) = wait else {
            return Ok(());
        };

        let result = poll_until(
            move || async move {
                match self.store.get(&self.kind, id).await {
                    Err(StoreError::NotFound { .. }) => Ok(Poll::Done(())),
                    Ok(_) => Ok(Poll::Pending),
                    Err(StoreError::Transport(e)) => {
                        debug!(event = "PollTransportError", error = %e);
                        Ok(Poll::Pending)
                    },
                    Err(e) => Err(self.store_error(Operation::Delete, id, e)),
                }
            },
            wait.poll_interval,
            wait.timeout.duration(),
        )
        .await;

        match result {
            Ok(()) => {
                info!(event = "DeletionConfirmed");
                Ok(())
            },
            // A zero timeout checks once and accepts whatever it saw
            Err(PollError::Timeout { .. }) if wait.timeout.duration().is_zero() => {
                info!(event = "DeletionNotConfirmed");
                Ok(())
            },
            Err(PollError::Timeout { waited, .. }) => Err(LifecycleError::Timeout {
                operation: Operation::Delete,
                target: self.target(id),
                condition: "object to be removed".to_string(),
                waited,
            }),
            Err(PollError::Check(e)) => Err(e),
        }
    }

    /// Recover an identity from an import token: `namespace/name` for
    /// namespaced kinds, a bare name for cluster scoped kinds
    pub fn import(&self, token: &str) -> Result<ResourceIdentity> {
        let imported = if self.kind.is_namespaced() {
            ResourceIdentity::from_import_token(token)
        } else {
            ResourceIdentity::from_cluster_import_token(token)
        };
        match &imported {
            Ok(id) => info!(event = "Imported", kind = %self.kind, id = %id),
            Err(e) => warn!(event = "ImportRejected", kind = %self.kind, error = %e),
        }
        imported
    }

    // Poll the live object, not the apply response, until the condition holds
    async fn wait_for(&self, id: &ResourceIdentity, wait: &WaitSpec) -> Result<()> {
        debug!(event = "Waiting", condition = wait.describe().as_str(), timeout = %wait.timeout);
        let expected = wait.expected_value.as_deref();

        let result = poll_until(
            move || async move {
                match self.store.get(&self.kind, id).await {
                    Ok(live) => Ok(if evaluate(&live, &wait.path).satisfies(expected) {
                        Poll::Done(())
                    } else {
                        Poll::Pending
                    }),
                    Err(StoreError::NotFound { .. }) => Ok(Poll::Pending),
                    Err(StoreError::Transport(e)) => {
                        debug!(event = "PollTransportError", error = %e);
                        Ok(Poll::Pending)
                    },
                    Err(e) => Err(self.store_error(Operation::Apply, id, e)),
                }
            },
            wait.poll_interval,
            wait.timeout.duration(),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(event = "ConditionMet", condition = wait.describe().as_str());
                Ok(())
            },
            Err(PollError::Timeout { waited, .. }) => Err(LifecycleError::Timeout {
                operation: Operation::Apply,
                target: self.target(id),
                condition: wait.describe(),
                waited,
            }),
            Err(PollError::Check(e)) => Err(e),
        }
    }

    fn decode(&self, operation: Operation, id: &ResourceIdentity, response: Value) -> Result<RemoteDocument> {
        RemoteDocument::decode(response).map_err(|reason| {
            error!(event = "DecodeFailed", operation = %operation, kind = %self.kind, id = %id, reason = reason.as_str());
            LifecycleError::Decode {
                operation,
                target: self.target(id),
                reason,
                source: None,
            }
        })
    }

    fn store_error(&self, operation: Operation, id: &ResourceIdentity, error: StoreError) -> LifecycleError {
        let error = LifecycleError::from_store(operation, self.target(id), error);
        match &error {
            LifecycleError::Decode { .. } => error!(event = "DecodeFailed", error = %error),
            LifecycleError::NotFound { .. } => debug!(event = "NotFound", operation = %operation),
            _ => warn!(event = "OperationFailed", error = %error),
        }
        error
    }

    fn target(&self, id: &ResourceIdentity) -> String {
        format!("{} {}", self.kind, id.display_id())
    }
}
