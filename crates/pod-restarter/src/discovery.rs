//! Candidate discovery: Event matching, staleness filtering and de-duplication.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::cluster::PodEvent;

/// Keep only Events whose reason equals `reason` and whose message contains
/// `message_substring` (case-sensitive, plain substring).
pub fn match_events(events: Vec<PodEvent>, reason: &str, message_substring: &str) -> Vec<PodEvent> {
    events
        .into_iter()
        .filter(|event| event.reason == reason && event.message.contains(message_substring))
        .collect()
}

/// Drop Events last seen before `now - polling_interval`.
///
/// The first iteration (`iteration == 0`) keeps everything so the whole Event
/// retention window is swept once. Events without any timestamp cannot be
/// placed in the window and are dropped on later iterations.
pub fn filter_stale(
    events: Vec<PodEvent>,
    iteration: u64,
    polling_interval: Duration,
    now: DateTime<Utc>,
) -> Vec<PodEvent> {
    if iteration == 0 {
        return events;
    }

    // Event timestamps have whole-second precision.
    let cutoff = chrono::Duration::from_std(polling_interval)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .map_or(DateTime::<Utc>::MIN_UTC, |cutoff| cutoff.trunc_subsecs(0));

    events
        .into_iter()
        .filter(|event| event.last_timestamp.is_some_and(|seen| seen >= cutoff))
        .collect()
}

/// A Pod selected for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

/// Distinct Pods referenced by matching Events, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Reduce Events to one candidate per Pod.
    ///
    /// Events are de-duplicated by Pod UID; the first Event in list order
    /// wins. Events without a UID are keyed on `(namespace, name)` alone. A later UID for a `(namespace, name)` already present (a Pod
    /// recreated under the same name) collapses into the existing entry, since
    /// validation works by name.
    pub fn from_events(events: &[PodEvent]) -> Self {
        let mut seen_uids: HashSet<&str> = HashSet::new();
        let mut seen_pods: HashSet<(&str, &str)> = HashSet::new();
        let mut candidates = Vec::new();

        for event in events {
            // Events from some emitters carry no involved-object UID.
            if !event.uid.is_empty() && !seen_uids.insert(event.uid.as_str()) {
                continue;
            }
            if !seen_pods.insert((event.pod_namespace.as_str(), event.pod_name.as_str())) {
                continue;
            }
            candidates.push(Candidate {
                name: event.pod_name.clone(),
                namespace: event.pod_namespace.clone(),
                uid: event.uid.clone(),
            });
        }

        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn contains(&self, name: &str, namespace: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| c.name == name && c.namespace == namespace)
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Output of the discovery phase.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Events matching reason and message.
    pub matched: usize,
    /// Matching Events that survived the staleness filter.
    pub fresh: usize,
    pub candidates: CandidateSet,
}

/// Run matching, staleness filtering and de-duplication over listed Events.
pub fn discover(
    events: Vec<PodEvent>,
    reason: &str,
    message_substring: &str,
    iteration: u64,
    polling_interval: Duration,
    now: DateTime<Utc>,
) -> Discovery {
    let matched = match_events(events, reason, message_substring);
    let matched_count = matched.len();
    let fresh = filter_stale(matched, iteration, polling_interval, now);
    let candidates = CandidateSet::from_events(&fresh);

    Discovery {
        matched: matched_count,
        fresh: fresh.len(),
        candidates,
    }
}
