//! Error types for stevedore-kube

use std::time::Duration;
use thiserror::Error;

use crate::resource::ResourceRef;

/// Result type for stevedore-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while converging or synchronizing a component
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Requested resource is absent
    #[error("{resource} not found")]
    NotFound { resource: ResourceRef },

    /// A watch deadline elapsed without a matching or terminal event
    #[error("timed out after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: ResourceRef,
        elapsed: Duration,
    },

    /// The observed object reached a failure state
    #[error("{resource} reached terminal state '{state}'")]
    TerminalFailure { resource: ResourceRef, state: String },

    /// An update was rejected because of a concurrent modification
    #[error("conflict updating {resource}: {message}")]
    Conflict {
        resource: ResourceRef,
        message: String,
    },

    /// Local precondition violated, detected before any network call
    #[error("invalid input: {0}")]
    MalformedInput(String),

    /// The server closed the event stream before a terminal match
    #[error("watch on {resource} was closed unexpectedly")]
    StreamClosed { resource: ResourceRef },

    /// The server reported an error on the event stream
    #[error("watch on {resource} failed: {message}")]
    WatchFailed {
        resource: ResourceRef,
        message: String,
    },

    /// Pipe, tar or remote-exec transport failure
    #[error("stream failure: {0}")]
    Stream(String),

    /// Remote command failed
    #[error("command {command:?} in pod '{pod}' failed: {message}")]
    Exec {
        pod: String,
        command: Vec<String>,
        message: String,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),

    /// Core (parsing/config) error
    #[error(transparent)]
    Core(#[from] stevedore_core::CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Translate a raw API error for `resource`: 404 and 409 get their own variants
    pub fn from_api(resource: &ResourceRef, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => KubeError::NotFound {
                resource: resource.clone(),
            },
            kube::Error::Api(resp) if resp.code == 409 => KubeError::Conflict {
                resource: resource.clone(),
                message: resp.message,
            },
            other => KubeError::Api(other),
        }
    }

    /// Check if this is a Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Conflict { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Check if a watch deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, KubeError::Timeout { .. })
    }
}
