//! Flattened views of the cluster objects the reconciler reads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cluster Event about a Pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodEvent {
    /// UID of the involved Pod.
    pub uid: String,
    pub pod_name: String,
    pub pod_namespace: String,
    pub resource_version: String,
    pub reason: String,
    /// `Normal` or `Warning`.
    pub event_type: String,
    pub message: String,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Coarse lifecycle state of a Pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            "Unknown" => Ok(Self::Unknown),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.pad(phase)
    }
}

/// Back-reference to the controller that created a Pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

/// Terminated sub-state of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedState {
    pub exit_code: i32,
    pub reason: Option<String>,
}

impl TerminatedState {
    /// A container that ran to completion successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.exit_code == 0 && self.reason.as_deref() == Some("Completed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatusSummary {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub terminated: Option<TerminatedState>,
}

/// Snapshot of a Pod, read fresh for every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodDetails {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub resource_version: String,
    pub owner_references: Vec<OwnerRef>,
    pub phase: PodPhase,
    pub container_statuses: Vec<ContainerStatusSummary>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Set once a graceful deletion is in flight.
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl PodDetails {
    #[must_use]
    pub fn has_owner(&self) -> bool {
        !self.owner_references.is_empty()
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}
