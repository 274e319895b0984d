/*
 * Pod Restarter - failure-triggered Pod reconciliation
 * Copyright (C) 2025 Pod Restarter maintainers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Failure-triggered Pod reconciliation.
//!
//! Pods that keep failing with a known Event signature (by default the
//! `FailedCreatePodSandBox` "veth name already exists" CNI error) rarely
//! recover on their own. This crate polls cluster Events for that signature
//! and deletes the affected Pods so their owning controller recreates them.
//!
//! ## Flow
//!
//! ```text
//! list Events ─► match reason/message ─► drop stale ─► dedup by Pod UID
//!                                                          │
//!                                                     grace sleep
//!                                                          │
//!        delete (or dry-run) ◄─ unhealthy ◄─ not deleting ◄─ owned ◄─ exists
//! ```
//!
//! A Pod is only deleted after a fresh read confirms it still exists, has an
//! owner, is not already terminating, and is not healthy.
//!
//! ## Example
//!
//! ```ignore
//! use pod_restarter::{cluster, KubeCluster, ReconcileSession, RestarterConfig};
//!
//! let client = cluster::connect(None).await?;
//! let mut session = ReconcileSession::new(KubeCluster::new(client), RestarterConfig::default());
//! session
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! ```

pub mod actuator;
pub mod checks;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod scheduler;

pub use actuator::{delete_candidate, DeleteOutcome};
pub use checks::{classify_health, pod_checks, Health, RejectReason};
pub use cluster::{ClusterFacade, KubeCluster, PodDetails, PodEvent, PodPhase};
pub use config::{NamespaceScope, RestarterConfig};
pub use discovery::{Candidate, CandidateSet};
pub use error::{ClientError, ClusterError, ConfigError};
pub use scheduler::{run_one_iteration, IterationReport, ReconcileSession, RejectCounts};
