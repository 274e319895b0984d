//! Read/write access to the cluster.
//!
//! The reconciler only talks to the cluster through [`ClusterFacade`], so the
//! pipeline can run against [`KubeCluster`] in production and against an
//! in-memory fake in tests.

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::config::NamespaceScope;
use crate::error::ClusterError;

pub use client::{connect, KubeCluster};
pub use types::{ContainerStatusSummary, OwnerRef, PodDetails, PodEvent, PodPhase, TerminatedState};

/// Cluster operations consumed by the reconciliation core.
///
/// Timeouts are the transport's concern; implementations must not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterFacade: Send + Sync {
    /// List Pod Events in scope, in the order the API returns them.
    async fn list_events(&self, scope: &NamespaceScope) -> Result<Vec<PodEvent>, ClusterError>;

    /// Read one Pod. Returns [`ClusterError::NotFound`] if it no longer exists.
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodDetails, ClusterError>;

    /// Delete one Pod. Returns [`ClusterError::NotFound`] if it is already gone.
    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError>;

    /// List every Pod in scope.
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodDetails>, ClusterError>;

    /// List every Event recorded for one Pod, whatever its reason.
    async fn list_pod_events(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<PodEvent>, ClusterError>;
}
