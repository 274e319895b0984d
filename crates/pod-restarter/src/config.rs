//! Reconciliation configuration.
//!
//! Values normally come from command-line flags (with environment fallbacks),
//! or from a YAML file mounted into the Pod.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Event reason matched by default.
pub const DEFAULT_EVENT_REASON: &str = "FailedCreatePodSandBox";

/// Event message substring matched by default.
pub const DEFAULT_ERROR_MESSAGE: &str = "container veth name provided (eth0) already exists";

/// Seconds between the start of two iterations.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 30;

/// Seconds a freshly discovered candidate gets to heal on its own.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Where Events and Pods are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceScope {
    /// Every namespace in the cluster.
    #[default]
    All,
    /// A single namespace.
    Namespace(String),
}

impl NamespaceScope {
    /// Parse a namespace flag; the empty string means all namespaces.
    #[must_use]
    pub fn parse(namespace: &str) -> Self {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            Self::All
        } else {
            Self::Namespace(namespace.to_string())
        }
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all namespaces"),
            Self::Namespace(ns) => write!(f, "namespace {ns}"),
        }
    }
}

/// Settings for one reconciliation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestarterConfig {
    /// Exact Event reason to match.
    pub event_reason: String,

    /// Case-sensitive substring the Event message must contain.
    pub error_message: String,

    /// Namespace to watch; empty for all namespaces.
    pub namespace: String,

    /// Seconds between iteration starts; also the staleness window.
    pub polling_interval_secs: u64,

    /// Seconds to wait between discovery and validation.
    pub grace_period_secs: u64,

    /// Log deletions instead of performing them.
    pub dry_run: bool,
}

impl Default for RestarterConfig {
    fn default() -> Self {
        Self {
            event_reason: DEFAULT_EVENT_REASON.to_string(),
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            namespace: String::new(),
            polling_interval_secs: DEFAULT_POLLING_INTERVAL_SECS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            dry_run: false,
        }
    }
}

impl RestarterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from YAML; missing keys take their defaults.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Check the configuration for values the loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_reason.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "event reason must not be empty".to_string(),
            ));
        }
        // An empty substring would match every Event carrying the reason.
        if self.error_message.is_empty() {
            return Err(ConfigError::Invalid(
                "error message must not be empty".to_string(),
            ));
        }
        if self.polling_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn scope(&self) -> NamespaceScope {
        NamespaceScope::parse(&self.namespace)
    }

    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}
