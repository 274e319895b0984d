//! [`ClusterFacade`] backed by the Kubernetes API.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Event, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{debug, info, warn};

use super::types::{
    ContainerStatusSummary, OwnerRef, PodDetails, PodEvent, PodPhase, TerminatedState,
};
use super::ClusterFacade;
use crate::config::NamespaceScope;
use crate::error::{ClientError, ClusterError};

/// Only Events whose involved object is a Pod are of interest.
const POD_EVENTS_SELECTOR: &str = "involvedObject.kind=Pod";

/// Build a client, preferring the in-cluster service account.
///
/// Outside a cluster the given kubeconfig is used, or the configuration is
/// inferred from `KUBECONFIG` / `~/.kube/config` when no path is given.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client, ClientError> {
    let config = match Config::incluster() {
        Ok(config) => {
            info!("Running from INSIDE the cluster");
            config
        }
        Err(in_cluster) => {
            debug!(error = %in_cluster, "In-cluster configuration unavailable");
            let config = match kubeconfig {
                Some(path) => from_kubeconfig_file(path).await?,
                None => Config::infer().await?,
            };
            info!("Running from OUTSIDE the cluster");
            config
        }
    };

    debug!(cluster_url = %config.cluster_url, "Creating Kubernetes client");
    Ok(Client::try_from(config)?)
}

async fn from_kubeconfig_file(path: &Path) -> Result<Config, ClientError> {
    let to_error = |source| ClientError::Kubeconfig {
        path: path.to_path_buf(),
        source,
    };
    let kubeconfig = Kubeconfig::read_from(path).map_err(to_error)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(to_error)
}

/// Cluster facade over a shared [`kube::Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn events(&self, scope: &NamespaceScope) -> Api<Event> {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    fn pods(&self, scope: &NamespaceScope) -> Api<Pod> {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    fn namespaced_pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterFacade for KubeCluster {
    async fn list_events(&self, scope: &NamespaceScope) -> Result<Vec<PodEvent>, ClusterError> {
        let started = Instant::now();
        let params = ListParams::default().fields(POD_EVENTS_SELECTOR);
        let events = self
            .events(scope)
            .list(&params)
            .await
            .map_err(|source| ClusterError::ListEvents {
                scope: scope.to_string(),
                source,
            })?;

        debug!(
            count = events.items.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Listed Pod Events in {}",
            scope
        );
        Ok(events.items.iter().map(flatten_event).collect())
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodDetails, ClusterError> {
        match self.namespaced_pods(namespace).get(name).await {
            Ok(pod) => Ok(flatten_pod(&pod)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(ClusterError::pod_not_found(name, namespace))
            }
            Err(source) => Err(ClusterError::GetPod {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        match self
            .namespaced_pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(ClusterError::pod_not_found(name, namespace))
            }
            Err(source) => Err(ClusterError::DeletePod {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodDetails>, ClusterError> {
        let pods = self
            .pods(scope)
            .list(&ListParams::default())
            .await
            .map_err(|source| ClusterError::ListPods {
                scope: scope.to_string(),
                source,
            })?;

        info!("There is a TOTAL of {} Pods in {}", pods.items.len(), scope);
        Ok(pods.items.iter().map(flatten_pod).collect())
    }

    async fn list_pod_events(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<PodEvent>, ClusterError> {
        let selector = format!("{POD_EVENTS_SELECTOR},involvedObject.name={name}");
        let params = ListParams::default().fields(&selector);
        let scope = NamespaceScope::Namespace(namespace.to_string());
        let events = self
            .events(&scope)
            .list(&params)
            .await
            .map_err(|source| ClusterError::ListEvents {
                scope: scope.to_string(),
                source,
            })?;
        Ok(events.items.iter().map(flatten_event).collect())
    }
}

/// Flatten a core/v1 Event into a [`PodEvent`].
///
/// `lastTimestamp` is empty for Events written through the events.k8s.io
/// API, so it falls back to `eventTime`, `firstTimestamp`, then the object's
/// creation time.
pub fn flatten_event(event: &Event) -> PodEvent {
    let involved = &event.involved_object;
    let first_timestamp = event.first_timestamp.as_ref().map(|t| t.0);
    let last_timestamp = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or(first_timestamp)
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0));

    PodEvent {
        uid: involved.uid.clone().unwrap_or_default(),
        pod_name: involved.name.clone().unwrap_or_default(),
        pod_namespace: involved
            .namespace
            .clone()
            .or_else(|| event.metadata.namespace.clone())
            .unwrap_or_default(),
        resource_version: involved.resource_version.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        event_type: event.type_.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        first_timestamp,
        last_timestamp,
    }
}

/// Flatten a Pod into [`PodDetails`].
pub fn flatten_pod(pod: &Pod) -> PodDetails {
    let meta = &pod.metadata;
    let name = meta.name.clone().unwrap_or_default();
    let namespace = meta.namespace.clone().unwrap_or_default();
    let status = pod.status.as_ref();

    PodDetails {
        uid: meta.uid.clone().unwrap_or_default(),
        phase: parse_phase(status.and_then(|s| s.phase.as_deref()), &namespace, &name),
        container_statuses: status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| statuses.iter().map(summarize_container).collect())
            .unwrap_or_default(),
        owner_references: meta
            .owner_references
            .iter()
            .flatten()
            .map(|owner| OwnerRef {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                controller: owner.controller.unwrap_or(false),
            })
            .collect(),
        resource_version: meta.resource_version.clone().unwrap_or_default(),
        creation_timestamp: time_of(meta.creation_timestamp.as_ref()),
        deletion_timestamp: time_of(meta.deletion_timestamp.as_ref()),
        name,
        namespace,
    }
}

fn time_of(time: Option<&Time>) -> Option<DateTime<Utc>> {
    time.map(|t| t.0)
}

/// A Pod without a reported phase has not been scheduled yet.
fn parse_phase(phase: Option<&str>, namespace: &str, name: &str) -> PodPhase {
    match phase {
        None => PodPhase::Pending,
        Some(raw) => raw.parse().unwrap_or_else(|unrecognized: String| {
            warn!(
                pod = %name,
                namespace = %namespace,
                phase = %unrecognized,
                "Pod reports an unrecognized phase, treating it as Unknown"
            );
            PodPhase::Unknown
        }),
    }
}

fn summarize_container(status: &ContainerStatus) -> ContainerStatusSummary {
    ContainerStatusSummary {
        name: status.name.clone(),
        ready: status.ready,
        restart_count: status.restart_count,
        terminated: status
            .state
            .as_ref()
            .and_then(|state| state.terminated.as_ref())
            .map(|terminated| TerminatedState {
                exit_code: terminated.exit_code,
                reason: terminated.reason.clone(),
            }),
    }
}
