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

//! Pod Restarter CLI
//!
//! Runs inside or outside a cluster and deletes Pods stuck on a known failure
//! Event (e.g. `FailedCreatePodSandBox`) so their controller recreates them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pod_restarter::cluster::{connect, ClusterFacade, KubeCluster};
use pod_restarter::config::{
    DEFAULT_ERROR_MESSAGE, DEFAULT_EVENT_REASON, DEFAULT_GRACE_PERIOD_SECS,
    DEFAULT_POLLING_INTERVAL_SECS,
};
use pod_restarter::{classify_health, pod_checks, ReconcileSession, RestarterConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Delete Pods that keep failing with a known Event so their owner recreates them
#[derive(Parser)]
#[command(name = "pod-restarter")]
#[command(about = "Delete Pods that keep failing with a known Event so their owner recreates them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Restart Pods that match this Event reason
    #[arg(long, env = "POD_RESTARTER_REASON", default_value = DEFAULT_EVENT_REASON, global = true)]
    reason: String,

    /// Substring the Event message must contain
    #[arg(
        long,
        env = "POD_RESTARTER_ERROR_MESSAGE",
        default_value = DEFAULT_ERROR_MESSAGE,
        global = true
    )]
    error_message: String,

    /// Kubernetes namespace (empty for all namespaces)
    #[arg(long, env = "POD_RESTARTER_NAMESPACE", default_value = "", global = true)]
    namespace: String,

    /// Number of seconds between iterations
    #[arg(
        long,
        env = "POD_RESTARTER_POLLING_INTERVAL",
        default_value_t = DEFAULT_POLLING_INTERVAL_SECS,
        global = true
    )]
    polling_interval: u64,

    /// Seconds to let a failing Pod self heal before it is checked
    #[arg(
        long,
        env = "POD_RESTARTER_GRACE_PERIOD",
        default_value_t = DEFAULT_GRACE_PERIOD_SECS,
        global = true
    )]
    grace_period: u64,

    /// Enable dry run mode (no changes are made, only logged)
    #[arg(long, env = "POD_RESTARTER_DRY_RUN", global = true)]
    dry_run: bool,

    /// Path to a kubeconfig file (defaults to KUBECONFIG or ~/.kube/config)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// YAML config file; replaces the matching flags when given
    #[arg(long, env = "POD_RESTARTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Reconcile continuously until SIGINT/SIGTERM (default)
    Run,

    /// Run a single iteration over all Event history and print the report as JSON
    Once,

    /// Show how Pods would be judged, without deleting anything
    Inspect {
        /// Pod to check; all Pods in scope are listed when omitted
        #[arg(long)]
        pod: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn restarter_config(&self) -> Result<RestarterConfig> {
        let mut config = match &self.config {
            Some(path) => RestarterConfig::from_file(path)?,
            None => RestarterConfig {
                event_reason: self.reason.clone(),
                error_message: self.error_message.clone(),
                namespace: self.namespace.clone(),
                polling_interval_secs: self.polling_interval,
                grace_period_secs: self.grace_period,
                dry_run: self.dry_run,
            },
        };
        // The flag can only switch dry-run on, never off.
        config.dry_run |= self.dry_run;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    let config = cli
        .restarter_config()
        .context("Failed to load configuration")?;

    info!(
        "Starting Pod Restarter v{} (reason: {}, namespace: {}, dry-run: {})",
        env!("CARGO_PKG_VERSION"),
        config.event_reason,
        config.scope(),
        config.dry_run
    );

    // Authenticate once; a failure here is the only fatal error.
    let client = connect(cli.kubeconfig.as_deref())
        .await
        .context("Failed to connect to the Kubernetes cluster")?;
    let cluster = KubeCluster::new(client);

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut session = ReconcileSession::new(cluster, config);
            session.run_until(shutdown_signal()).await;
        }
        Commands::Once => {
            let mut session = ReconcileSession::new(cluster, config);
            let report = session.run_iteration().await;
            report.log();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Inspect { pod: Some(pod) } => inspect_pod(&cluster, &config, &pod).await?,
        Commands::Inspect { pod: None } => inspect_scope(&cluster, &config).await?,
    }

    Ok(())
}

async fn inspect_pod(cluster: &KubeCluster, config: &RestarterConfig, pod: &str) -> Result<()> {
    let namespace = match config.namespace.trim() {
        "" => "default",
        ns => ns,
    };

    match pod_checks(cluster, pod, namespace).await {
        Ok(()) => println!("\n{namespace}/{pod}: eligible for deletion"),
        Err(reason) => println!("\n{namespace}/{pod}: not eligible ({reason})"),
    }

    let events = cluster.list_pod_events(pod, namespace).await?;
    if events.is_empty() {
        println!("No Events recorded for {namespace}/{pod}");
        return Ok(());
    }

    println!("\n{:<25} {:<9} {:<28} MESSAGE", "LAST SEEN", "TYPE", "REASON");
    println!("{}", "-".repeat(100));
    for event in events {
        let last_seen = event
            .last_timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let matches = event.reason == config.event_reason
            && event.message.contains(&config.error_message);
        println!(
            "{:<25} {:<9} {:<28} {}{}",
            last_seen,
            event.event_type,
            event.reason,
            if matches { "* " } else { "" },
            event.message
        );
    }
    println!();
    Ok(())
}

async fn inspect_scope(cluster: &KubeCluster, config: &RestarterConfig) -> Result<()> {
    let pods = cluster.list_pods(&config.scope()).await?;

    println!(
        "\n{:<20} {:<45} {:<10} {:<6} {:<10}",
        "NAMESPACE", "NAME", "PHASE", "OWNED", "HEALTH"
    );
    println!("{}", "-".repeat(95));
    for pod in pods {
        let health = if pod.is_being_deleted() {
            "Deleting".to_string()
        } else {
            format!("{:?}", classify_health(&pod))
        };
        println!(
            "{:<20} {:<45} {:<10} {:<6} {:<10}",
            pod.namespace,
            pod.name,
            pod.phase,
            if pod.has_owner() { "yes" } else { "no" },
            health
        );
    }
    println!();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
