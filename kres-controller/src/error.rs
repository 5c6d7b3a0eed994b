// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::fmt::{self, Display, Formatter};
use std::result;
use std::time::Duration;
use thiserror::Error;

use crate::condition::PathError;
use crate::document::RemoteDocument;
use crate::store::StoreError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The lifecycle operation an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Read,
    Delete,
    Import,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Apply => "apply",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::Import => "import",
        };
        f.write_str(name)
    }
}

/// Failure of a single lifecycle operation. `target` names the kind and
/// display id of the object, e.g. `apps/v1/Deployment web/default`.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{operation} {target}: object not found")]
    NotFound {
        operation: Operation,
        target: String,
        #[source]
        source: Option<StoreError>,
    },
    #[error("{operation} {target}: conflicting field ownership, retry with force_conflicts to take ownership")]
    Conflict {
        operation: Operation,
        target: String,
        #[source]
        source: StoreError,
    },
    #[error("{operation} {target}: remote call failed")]
    Transport {
        operation: Operation,
        target: String,
        #[source]
        source: StoreError,
    },
    #[error("{operation} {target}: malformed response: {reason}")]
    Decode {
        operation: Operation,
        target: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("{operation} {target}: timed out after {} waiting for {condition}", format_waited(.waited))]
    Timeout {
        operation: Operation,
        target: String,
        condition: String,
        waited: Duration,
    },
    #[error("invalid import token {token:?}: {reason}")]
    InvalidImportToken {
        token: String,
        reason: &'static str,
    },
}

impl LifecycleError {
    /// Map a store failure into the lifecycle taxonomy
    pub fn from_store(operation: Operation, target: impl Into<String>, error: StoreError) -> Self {
        let target = target.into();
        match error {
            StoreError::NotFound { .. } => LifecycleError::NotFound { operation, target, source: Some(error) },
            StoreError::Conflict { .. } => LifecycleError::Conflict { operation, target, source: error },
            StoreError::Transport(_) => LifecycleError::Transport { operation, target, source: error },
            StoreError::Decode(_) => LifecycleError::Decode {
                operation,
                target,
                reason: "response is not a valid object document".to_string(),
                source: Some(Box::new(error)),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LifecycleError::Conflict { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LifecycleError::Timeout { .. })
    }
}

fn format_waited(waited: &Duration) -> String {
    humantime::format_duration(*waited).to_string()
}

/// Failure of an Apply. When the object was written but a wait condition
/// did not resolve, `applied` holds the document returned by the apply so
/// the caller can record the partial success.
#[derive(Debug)]
pub struct ApplyError {
    pub error: LifecycleError,
    pub applied: Option<RemoteDocument>,
}

impl ApplyError {
    pub fn partial(error: LifecycleError, applied: RemoteDocument) -> Self {
        ApplyError { error, applied: Some(applied) }
    }

    pub fn into_parts(self) -> (LifecycleError, Option<RemoteDocument>) {
        (self.error, self.applied)
    }
}

impl From<LifecycleError> for ApplyError {
    fn from(error: LifecycleError) -> Self {
        ApplyError { error, applied: None }
    }
}

impl Display for ApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.applied {
            Some(_) => write!(f, "{} (object was applied)", self.error),
            None => Display::fmt(&self.error, f),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Errors raised while setting up a controller or translating adapter
/// arguments, before any remote call is made
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("failed to create client: {0}")]
    KubeError(#[from] kube::Error),
    #[error("unknown kind: {0}")]
    UnknownKind(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("invalid wait condition: {0}")]
    InvalidCondition(#[from] PathError),
    #[error("failed to render manifest: {0}")]
    RenderError(String),
}

pub type Result<T, E = LifecycleError> = result::Result<T, E>;
