//! Error types shared by the reconciliation core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by a [`ClusterFacade`](crate::cluster::ClusterFacade).
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The object does not exist (HTTP 404). Never escalated; the target
    /// resolved itself.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Listing Events failed.
    #[error("Could not list Events in {scope}: {source}")]
    ListEvents {
        scope: String,
        #[source]
        source: kube::Error,
    },

    /// Listing Pods failed.
    #[error("Could not list Pods in {scope}: {source}")]
    ListPods {
        scope: String,
        #[source]
        source: kube::Error,
    },

    /// Reading a single Pod failed for a reason other than not-found.
    #[error("Could not get Pod {namespace}/{name}: {source}")]
    GetPod {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// Deleting a Pod failed for a reason other than not-found.
    #[error("Could not delete Pod {namespace}/{name}: {source}")]
    DeletePod {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl ClusterError {
    /// Build a not-found error for a Pod.
    #[must_use]
    pub fn pod_not_found(name: &str, namespace: &str) -> Self {
        Self::NotFound {
            kind: "Pod",
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised while building the Kubernetes client. These are the only
/// fatal errors in the process.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The kubeconfig file could not be read or resolved.
    #[error("The kubeconfig {} cannot be loaded: {source}", .path.display())]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: kube::config::KubeconfigError,
    },

    /// No usable configuration could be inferred from the environment.
    #[error("No Kubernetes configuration could be inferred: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    /// The client itself could not be constructed from a valid configuration.
    #[error("The Kubernetes client cannot be created: {0}")]
    Client(#[from] kube::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
