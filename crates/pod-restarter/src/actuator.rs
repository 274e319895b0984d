//! Deletion of validated candidates.

use serde::Serialize;
use tracing::info;

use crate::cluster::ClusterFacade;
use crate::error::ClusterError;

/// What happened to a candidate that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The delete request was accepted.
    Deleted,
    /// Dry-run mode; the cluster was not contacted.
    DryRun,
    /// The Pod disappeared between validation and deletion.
    AlreadyGone,
}

/// Delete a Pod, or only log the intent in dry-run mode.
///
/// A not-found response counts as success. Any other failure is returned so
/// the caller can record it; the Pod is re-evaluated on the next iteration.
pub async fn delete_candidate<C>(
    cluster: &C,
    name: &str,
    namespace: &str,
    dry_run: bool,
) -> Result<DeleteOutcome, ClusterError>
where
    C: ClusterFacade + ?Sized,
{
    if dry_run {
        info!(
            pod = %name,
            namespace = %namespace,
            "[DRY-RUN]: Would have deleted Pod: {}/{}", namespace, name
        );
        return Ok(DeleteOutcome::DryRun);
    }

    match cluster.delete_pod(name, namespace).await {
        Ok(()) => {
            info!(pod = %name, namespace = %namespace, "DELETED Pod {}/{}", namespace, name);
            Ok(DeleteOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => {
            info!(
                pod = %name,
                namespace = %namespace,
                "Pod {}/{} was already gone when deleting", namespace, name
            );
            Ok(DeleteOutcome::AlreadyGone)
        }
        Err(e) => Err(e),
    }
}
