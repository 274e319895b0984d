//! Reconciliation loop.
//!
//! Each iteration runs Discover → grace sleep → validate-and-act, then the
//! loop sleeps out the rest of the polling interval. Candidates are handled
//! one at a time in discovery order; nothing runs concurrently.

use std::future::Future;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::actuator::{delete_candidate, DeleteOutcome};
use crate::checks::{pod_checks, RejectReason};
use crate::cluster::ClusterFacade;
use crate::config::RestarterConfig;
use crate::discovery::discover;

/// Candidates rejected by the validation pipeline, per reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RejectCounts {
    pub gone: usize,
    pub no_owner: usize,
    pub already_deleting: usize,
    pub already_healthy: usize,
    pub fetch_failed: usize,
}

impl RejectCounts {
    pub fn record(&mut self, reason: RejectReason) {
        *self.slot(reason) += 1;
    }

    #[must_use]
    pub fn get(&self, reason: RejectReason) -> usize {
        match reason {
            RejectReason::Gone => self.gone,
            RejectReason::NoOwner => self.no_owner,
            RejectReason::AlreadyDeleting => self.already_deleting,
            RejectReason::AlreadyHealthy => self.already_healthy,
            RejectReason::FetchFailed => self.fetch_failed,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.gone + self.no_owner + self.already_deleting + self.already_healthy + self.fetch_failed
    }

    fn slot(&mut self, reason: RejectReason) -> &mut usize {
        match reason {
            RejectReason::Gone => &mut self.gone,
            RejectReason::NoOwner => &mut self.no_owner,
            RejectReason::AlreadyDeleting => &mut self.already_deleting,
            RejectReason::AlreadyHealthy => &mut self.already_healthy,
            RejectReason::FetchFailed => &mut self.fetch_failed,
        }
    }
}

/// Summary of one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    /// Iteration counter value the pass ran with.
    pub iteration: u64,
    /// Events matching reason and message.
    pub events_matched: usize,
    /// Matching Events kept by the staleness filter.
    pub events_fresh: usize,
    pub candidates: usize,
    pub deleted: usize,
    /// Deletions skipped because of dry-run mode.
    pub dry_run_intents: usize,
    /// Deletes that found the Pod already gone.
    pub already_gone: usize,
    pub delete_failures: usize,
    pub rejected: RejectCounts,
    /// Set when Events could not be listed; nothing else ran.
    pub fetch_error: Option<String>,
    pub duration_ms: u64,
}

impl IterationReport {
    /// Emit a one-line summary.
    pub fn log(&self) {
        if let Some(fetch_error) = &self.fetch_error {
            warn!(
                iteration = self.iteration,
                error = %fetch_error,
                "Iteration skipped: could not list Events"
            );
            return;
        }

        info!(
            iteration = self.iteration,
            events_matched = self.events_matched,
            events_fresh = self.events_fresh,
            candidates = self.candidates,
            deleted = self.deleted,
            dry_run_intents = self.dry_run_intents,
            already_gone = self.already_gone,
            delete_failures = self.delete_failures,
            rejected = self.rejected.total(),
            gone = self.rejected.gone,
            no_owner = self.rejected.no_owner,
            already_deleting = self.rejected.already_deleting,
            already_healthy = self.rejected.already_healthy,
            fetch_failed = self.rejected.fetch_failed,
            duration_ms = self.duration_ms,
            "Iteration complete"
        );
    }
}

/// Run one full pass with an explicit iteration counter.
///
/// Listing Events is the only step whose failure ends the pass early; every
/// per-candidate failure is recorded and the next candidate is processed.
#[instrument(skip_all, fields(iteration = iteration))]
pub async fn run_one_iteration<C>(
    cluster: &C,
    config: &RestarterConfig,
    iteration: u64,
) -> IterationReport
where
    C: ClusterFacade + ?Sized,
{
    let started = Instant::now();
    let mut report = IterationReport {
        iteration,
        ..IterationReport::default()
    };

    let scope = config.scope();
    let events = match cluster.list_events(&scope).await {
        Ok(events) => events,
        Err(e) => {
            error!("{}", e);
            report.fetch_error = Some(e.to_string());
            report.duration_ms = elapsed_ms(started);
            return report;
        }
    };

    let discovery = discover(
        events,
        &config.event_reason,
        &config.error_message,
        iteration,
        config.polling_interval(),
        Utc::now(),
    );
    report.events_matched = discovery.matched;
    report.events_fresh = discovery.fresh;
    report.candidates = discovery.candidates.len();

    info!(
        "There is a total of {} Events with Reason: {}",
        discovery.fresh, config.event_reason
    );
    info!(
        "There is a total of {} Pods with Reason: {}",
        discovery.candidates.len(),
        config.event_reason
    );

    if discovery.candidates.is_empty() {
        report.duration_ms = elapsed_ms(started);
        return report;
    }

    // Give transient failures a chance to heal before judging them.
    tokio::time::sleep(config.grace_period()).await;

    for candidate in &discovery.candidates {
        if let Err(reason) = pod_checks(cluster, &candidate.name, &candidate.namespace).await {
            report.rejected.record(reason);
            continue;
        }

        match delete_candidate(cluster, &candidate.name, &candidate.namespace, config.dry_run)
            .await
        {
            Ok(DeleteOutcome::Deleted) => report.deleted += 1,
            Ok(DeleteOutcome::DryRun) => report.dry_run_intents += 1,
            Ok(DeleteOutcome::AlreadyGone) => report.already_gone += 1,
            Err(e) => {
                error!("{}", e);
                report.delete_failures += 1;
            }
        }
    }

    report.duration_ms = elapsed_ms(started);
    report
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// State carried across iterations of one reconciliation session.
pub struct ReconcileSession<C> {
    cluster: C,
    config: RestarterConfig,
    iteration: u64,
}

impl<C: ClusterFacade> ReconcileSession<C> {
    #[must_use]
    pub fn new(cluster: C, config: RestarterConfig) -> Self {
        Self {
            cluster,
            config,
            iteration: 0,
        }
    }

    /// Number of passes whose discovery succeeded so far.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    #[must_use]
    pub fn config(&self) -> &RestarterConfig {
        &self.config
    }

    #[must_use]
    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Run one pass and advance the counter.
    ///
    /// A pass counts as completed only once Events were listed. A pass that
    /// failed to list them leaves the counter untouched, so the full-history
    /// sweep happens on the first pass that actually saw the cluster.
    pub async fn run_iteration(&mut self) -> IterationReport {
        let report = run_one_iteration(&self.cluster, &self.config, self.iteration).await;
        if report.fetch_error.is_none() {
            self.iteration += 1;
        }
        report
    }

    /// Loop until `shutdown` resolves, starting a pass every polling interval.
    ///
    /// Shutdown is honoured at any await point; an interrupted pass is simply
    /// abandoned, as deletions are idempotent.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.polling_interval();

        loop {
            info!("Running every {} seconds", interval.as_secs());
            let started = Instant::now();

            tokio::select! {
                () = &mut shutdown => break,
                report = self.run_iteration() => report.log(),
            }

            let remaining = interval.saturating_sub(started.elapsed());
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(remaining) => {}
            }
        }

        info!(
            iterations = self.iteration,
            "Shutdown requested, stopping reconciliation loop"
        );
    }
}
