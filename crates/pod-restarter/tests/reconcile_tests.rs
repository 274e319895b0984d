//! End-to-end reconciliation tests against an in-memory cluster.
//!
//! These drive `ReconcileSession` through full iterations and assert on the
//! delete calls the fake cluster receives.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pod_restarter::cluster::{ContainerStatusSummary, OwnerRef, TerminatedState};
use pod_restarter::{
    ClusterError, ClusterFacade, NamespaceScope, PodDetails, PodEvent, PodPhase,
    ReconcileSession, RestarterConfig,
};
use tokio::time::Instant;

const REASON: &str = "FailedCreatePodSandBox";
const MESSAGE: &str = "container veth name provided (eth0) already exists";

// =============================================================================
// Fake cluster
// =============================================================================

#[derive(Default)]
struct FakeCluster {
    events: Mutex<Vec<PodEvent>>,
    pods: Mutex<HashMap<(String, String), PodDetails>>,
    /// Pods whose delete call fails with a server error.
    failing_deletes: Mutex<HashSet<String>>,
    /// Pods that turn healthy once the (paused) clock reaches the instant.
    heals_at: Mutex<HashMap<String, Instant>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    get_times: Mutex<Vec<Instant>>,
    delete_calls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn with_event(self, event: PodEvent) -> Self {
        self.events.lock().unwrap().push(event);
        self
    }

    fn with_pod(self, pod: PodDetails) -> Self {
        self.pods
            .lock()
            .unwrap()
            .insert((pod.namespace.clone(), pod.name.clone()), pod);
        self
    }

    fn failing_delete_for(self, name: &str) -> Self {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
        self
    }

    fn heals_at(self, name: &str, at: Instant) -> Self {
        self.heals_at.lock().unwrap().insert(name.to_string(), at);
        self
    }

    fn set_events(&self, events: Vec<PodEvent>) {
        *self.events.lock().unwrap() = events;
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

fn server_error(code: u16) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "internal error".to_string(),
        reason: "InternalError".to_string(),
        code,
    })
}

#[async_trait]
impl ClusterFacade for FakeCluster {
    async fn list_events(&self, scope: &NamespaceScope) -> Result<Vec<PodEvent>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().unwrap().clone();
        Ok(match scope {
            NamespaceScope::All => events,
            NamespaceScope::Namespace(ns) => events
                .into_iter()
                .filter(|e| &e.pod_namespace == ns)
                .collect(),
        })
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodDetails, ClusterError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        self.get_times.lock().unwrap().push(now);

        let mut pod = self
            .pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::pod_not_found(name, namespace))?;
        if self
            .heals_at
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|healed| *healed <= now)
        {
            pod.phase = PodPhase::Running;
        }
        Ok(pod)
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(ClusterError::DeletePod {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source: server_error(500),
            });
        }
        let removed = self
            .pods
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        match removed {
            Some(_) => {
                self.deleted
                    .lock()
                    .unwrap()
                    .push(format!("{namespace}/{name}"));
                Ok(())
            }
            None => Err(ClusterError::pod_not_found(name, namespace)),
        }
    }

    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<PodDetails>, ClusterError> {
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .values()
            .filter(|p| match scope {
                NamespaceScope::All => true,
                NamespaceScope::Namespace(ns) => &p.namespace == ns,
            })
            .cloned()
            .collect())
    }

    async fn list_pod_events(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<PodEvent>, ClusterError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.pod_name == name && e.pod_namespace == namespace)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn sandbox_event(uid: &str, name: &str, namespace: &str, last_seen: DateTime<Utc>) -> PodEvent {
    PodEvent {
        uid: uid.to_string(),
        pod_name: name.to_string(),
        pod_namespace: namespace.to_string(),
        resource_version: "1001".to_string(),
        reason: REASON.to_string(),
        event_type: "Warning".to_string(),
        message: format!(
            "Failed to create pod sandbox: rpc error: code = Unknown desc = {MESSAGE} ..."
        ),
        first_timestamp: Some(last_seen - Duration::seconds(20)),
        last_timestamp: Some(last_seen),
    }
}

fn replicaset_pod(uid: &str, name: &str, namespace: &str, phase: PodPhase) -> PodDetails {
    PodDetails {
        uid: uid.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        resource_version: "1000".to_string(),
        owner_references: vec![OwnerRef {
            kind: "ReplicaSet".to_string(),
            name: format!("{name}-rs"),
            controller: true,
        }],
        phase,
        container_statuses: Vec::new(),
        creation_timestamp: Some(Utc::now() - Duration::minutes(3)),
        deletion_timestamp: None,
    }
}

fn config() -> RestarterConfig {
    RestarterConfig {
        event_reason: REASON.to_string(),
        error_message: MESSAGE.to_string(),
        grace_period_secs: 0,
        ..RestarterConfig::default()
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_pending_owned_pod_is_deleted() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.candidates, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.rejected.total(), 0);
    assert_eq!(session.cluster().deleted(), vec!["default/foo".to_string()]);
}

#[tokio::test]
async fn test_unowned_pod_is_never_deleted() {
    let mut orphan = replicaset_pod("u1", "foo", "default", PodPhase::Pending);
    orphan.owner_references.clear();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(orphan);

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.rejected.no_owner, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(session.cluster().delete_calls(), 0);
}

#[tokio::test]
async fn test_duplicate_events_produce_one_candidate() {
    let now = Utc::now();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", now - Duration::seconds(10)))
        .with_event(sandbox_event("u1", "foo", "default", now))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.events_matched, 2);
    assert_eq!(report.candidates, 1);
    assert_eq!(session.cluster().get_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.cluster().delete_calls(), 1);
}

#[tokio::test]
async fn test_completed_running_pod_is_already_healthy() {
    let mut bar = replicaset_pod("u2", "bar", "default", PodPhase::Running);
    bar.container_statuses = vec![ContainerStatusSummary {
        name: "app".to_string(),
        ready: false,
        restart_count: 0,
        terminated: Some(TerminatedState {
            exit_code: 0,
            reason: Some("Completed".to_string()),
        }),
    }];
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u2", "bar", "default", Utc::now()))
        .with_pod(bar);

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.rejected.already_healthy, 1);
    assert_eq!(session.cluster().delete_calls(), 0);
}

#[tokio::test]
async fn test_dry_run_never_calls_delete() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let config = RestarterConfig {
        dry_run: true,
        ..config()
    };
    let mut session = ReconcileSession::new(cluster, config);
    let report = session.run_iteration().await;

    assert_eq!(report.dry_run_intents, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(session.cluster().delete_calls(), 0);
    assert!(session.cluster().deleted().is_empty());
}

#[tokio::test]
async fn test_stale_events_ignored_after_first_iteration() {
    let cluster = FakeCluster::default()
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let first = session.run_iteration().await;
    assert_eq!(first.candidates, 0);
    assert_eq!(session.iteration(), 1);

    // Matching reason and message, but last seen well before the poll window.
    session.cluster().set_events(vec![sandbox_event(
        "u1",
        "foo",
        "default",
        Utc::now() - Duration::minutes(10),
    )]);
    let second = session.run_iteration().await;

    assert_eq!(second.events_matched, 1);
    assert_eq!(second.events_fresh, 0);
    assert_eq!(second.candidates, 0);
    assert_eq!(session.cluster().delete_calls(), 0);
}

#[tokio::test]
async fn test_first_iteration_sweeps_old_history() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event(
            "u1",
            "foo",
            "default",
            Utc::now() - Duration::hours(1),
        ))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.events_fresh, 1);
    assert_eq!(report.deleted, 1);
}

#[tokio::test]
async fn test_deleted_pod_is_gone_on_next_iteration() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let first = session.run_iteration().await;
    assert_eq!(first.deleted, 1);

    // The Event is still inside the poll window, but the Pod no longer exists.
    let second = session.run_iteration().await;
    assert_eq!(second.candidates, 1);
    assert_eq!(second.rejected.gone, 1);
    assert_eq!(session.cluster().delete_calls(), 1);
}

#[tokio::test]
async fn test_delete_failure_does_not_stop_iteration() {
    let now = Utc::now();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "stuck", "default", now))
        .with_event(sandbox_event("u2", "foo", "default", now))
        .with_pod(replicaset_pod("u1", "stuck", "default", PodPhase::Pending))
        .with_pod(replicaset_pod("u2", "foo", "default", PodPhase::Failed))
        .failing_delete_for("stuck");

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.candidates, 2);
    assert_eq!(report.delete_failures, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(session.cluster().deleted(), vec!["default/foo".to_string()]);
}

#[tokio::test]
async fn test_mixed_candidates_are_counted_per_reason() {
    let now = Utc::now();
    let mut terminating = replicaset_pod("u3", "terminating", "default", PodPhase::Pending);
    terminating.deletion_timestamp = Some(now);
    let mut orphan = replicaset_pod("u4", "orphan", "default", PodPhase::Unknown);
    orphan.owner_references.clear();

    let mut unrelated = sandbox_event("u5", "other", "default", now);
    unrelated.message = "failed to setup network for sandbox".to_string();

    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "eligible", "default", now))
        .with_event(sandbox_event("u2", "vanished", "default", now))
        .with_event(sandbox_event("u3", "terminating", "default", now))
        .with_event(sandbox_event("u4", "orphan", "default", now))
        .with_event(unrelated)
        .with_pod(replicaset_pod("u1", "eligible", "default", PodPhase::Unknown))
        .with_pod(terminating)
        .with_pod(orphan);

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.events_matched, 4);
    assert_eq!(report.candidates, 4);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.rejected.gone, 1);
    assert_eq!(report.rejected.already_deleting, 1);
    assert_eq!(report.rejected.no_owner, 1);
    assert_eq!(session.cluster().deleted(), vec!["default/eligible".to_string()]);
}

#[tokio::test]
async fn test_namespace_scope_limits_discovery() {
    let now = Utc::now();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "web", "team-a", now))
        .with_event(sandbox_event("u2", "web", "team-b", now))
        .with_pod(replicaset_pod("u1", "web", "team-a", PodPhase::Pending))
        .with_pod(replicaset_pod("u2", "web", "team-b", PodPhase::Pending));

    let config = RestarterConfig {
        namespace: "team-b".to_string(),
        ..config()
    };
    let mut session = ReconcileSession::new(cluster, config);
    let report = session.run_iteration().await;

    assert_eq!(report.candidates, 1);
    assert_eq!(session.cluster().deleted(), vec!["team-b/web".to_string()]);
    assert_eq!(session.cluster().list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_report_serializes_reject_counts() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()));

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["candidates"], 1);
    assert_eq!(json["rejected"]["gone"], 1);
    assert!(json["fetch_error"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_validation_waits_for_grace_period() {
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending));

    let config = RestarterConfig {
        grace_period_secs: 5,
        ..config()
    };
    let started = Instant::now();
    let mut session = ReconcileSession::new(cluster, config);
    let report = session.run_iteration().await;

    let get_times = session.cluster().get_times.lock().unwrap().clone();
    assert_eq!(get_times.len(), 1);
    assert!(get_times[0].duration_since(started) >= std::time::Duration::from_secs(5));
    assert_eq!(report.deleted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pod_healing_during_grace_period_is_kept() {
    let started = Instant::now();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("u1", "foo", "default", Utc::now()))
        .with_pod(replicaset_pod("u1", "foo", "default", PodPhase::Pending))
        .heals_at("foo", started + std::time::Duration::from_secs(2));

    let config = RestarterConfig {
        grace_period_secs: 5,
        ..config()
    };
    let mut session = ReconcileSession::new(cluster, config);
    let report = session.run_iteration().await;

    assert_eq!(report.rejected.already_healthy, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(session.cluster().delete_calls(), 0);
}

#[tokio::test]
async fn test_events_without_uid_each_become_candidates() {
    let now = Utc::now();
    let cluster = FakeCluster::default()
        .with_event(sandbox_event("", "a", "default", now))
        .with_event(sandbox_event("", "b", "default", now))
        .with_pod(replicaset_pod("ua", "a", "default", PodPhase::Pending))
        .with_pod(replicaset_pod("ub", "b", "default", PodPhase::Pending));

    let mut session = ReconcileSession::new(cluster, config());
    let report = session.run_iteration().await;

    assert_eq!(report.candidates, 2);
    assert_eq!(
        session.cluster().deleted(),
        vec!["default/a".to_string(), "default/b".to_string()]
    );
}
