//! Validation pipeline run against every candidate before deletion.
//!
//! A Pod is eligible for deletion only if it
//! 1. still exists,
//! 2. has an owner that will recreate it,
//! 3. is not already being deleted,
//! 4. and is not healthy (Pending, Failed, Unknown, or Running with a
//!    container that terminated abnormally).

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterFacade, PodDetails, PodPhase};

/// Why a candidate was not deleted. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The Pod no longer exists.
    Gone,
    /// The Pod has no owner references; nothing would recreate it.
    NoOwner,
    /// A deletion is already in flight.
    AlreadyDeleting,
    /// The Pod healed on its own.
    AlreadyHealthy,
    /// The Pod could not be read.
    FetchFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Gone => "gone",
            Self::NoOwner => "no_owner",
            Self::AlreadyDeleting => "already_deleting",
            Self::AlreadyHealthy => "already_healthy",
            Self::FetchFailed => "fetch_failed",
        };
        f.pad(reason)
    }
}

/// Health classification of a Pod snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// Classify a Pod from its phase and container statuses.
pub fn classify_health(pod: &PodDetails) -> Health {
    match pod.phase {
        PodPhase::Pending | PodPhase::Failed | PodPhase::Unknown => Health::Unhealthy,
        PodPhase::Succeeded => Health::Healthy,
        PodPhase::Running => {
            // Status not populated yet; nothing to judge.
            if pod.container_statuses.is_empty() {
                debug!(
                    pod = %pod.name,
                    namespace = %pod.namespace,
                    "Pod is Running without container statuses"
                );
                return Health::Healthy;
            }

            let failed = pod.container_statuses.iter().find(|container| {
                container
                    .terminated
                    .as_ref()
                    .is_some_and(|terminated| !terminated.is_completed())
            });

            match failed {
                Some(container) => {
                    debug!(
                        pod = %pod.name,
                        namespace = %pod.namespace,
                        container = %container.name,
                        terminated = ?container.terminated,
                        "Pod is Running with a failed container"
                    );
                    Health::Unhealthy
                }
                None => Health::Healthy,
            }
        }
    }
}

/// Check one candidate, reading a fresh snapshot of the Pod.
///
/// Returns `Ok(())` when the Pod should be deleted.
#[instrument(skip_all, fields(pod = %name, namespace = %namespace))]
pub async fn pod_checks<C>(cluster: &C, name: &str, namespace: &str) -> Result<(), RejectReason>
where
    C: ClusterFacade + ?Sized,
{
    let pod = match cluster.get_pod(name, namespace).await {
        Ok(pod) => pod,
        Err(e) if e.is_not_found() => {
            info!("Pod {}/{} does not exist anymore", namespace, name);
            return Err(RejectReason::Gone);
        }
        Err(e) => {
            warn!("{}", e);
            return Err(RejectReason::FetchFailed);
        }
    };

    if !pod.has_owner() {
        info!("Pod does not have owner/controller: {}/{}", namespace, name);
        return Err(RejectReason::NoOwner);
    }

    if let Some(deletion) = pod.deletion_timestamp {
        info!(
            deletion_timestamp = %deletion,
            "Pod has already been scheduled to be deleted: {}/{}", namespace, name
        );
        return Err(RejectReason::AlreadyDeleting);
    }

    match classify_health(&pod) {
        Health::Healthy => {
            info!(
                phase = %pod.phase,
                "Pod is in a Healthy state: {}/{}", namespace, name
            );
            Err(RejectReason::AlreadyHealthy)
        }
        Health::Unhealthy => {
            debug!(phase = %pod.phase, "Pod is unhealthy and eligible for deletion");
            Ok(())
        }
    }
}
