//! kvup - Kubernetes version upgrade runner.
//!
//! Moves a `ManagedCluster` to the next consecutive Kubernetes minor version,
//! keeping worker pools pinned below the control plane one minor behind, and
//! verifies that every node converges. Highly available control planes are
//! probed for API server downtime during the rollout.

mod catalog;
mod cluster;
mod config;
mod crd;
mod error;
mod executor;
mod k8s;
mod planner;
mod poll;
mod validator;
mod verifier;
mod version;
mod workflow;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog::VersionCatalog;
use cluster::ClusterApi;
use config::{Args, BUILD_DATE, COMMIT, Config, LogFormat, VERSION};
use k8s::{KubeCluster, KubeNodes, KubeWorkloads, build_kube_client, fetch_apiserver_auth_token};
use workflow::{UpgradeOutcome, UpgradeWorkflow};

#[tokio::main]
async fn main() {
    let config = Config::from_args(Args::parse());

    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting kvup v{} (commit: {}, build: {})",
        VERSION, COMMIT, BUILD_DATE
    );

    if let Err(e) = run(config).await {
        error!("Upgrade failed: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber. `RUST_LOG` wins over `--log-level`.
fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {e}"))?;

    match format {
        LogFormat::Json => fmt().with_env_filter(filter).json().with_target(true).init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).init(),
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let management = build_kube_client(config.kubeconfig.as_deref()).await?;
    let target = build_kube_client(Some(&config.target_kubeconfig)).await?;
    let seed = match config.seed_kubeconfig.as_deref() {
        Some(path) => build_kube_client(Some(path)).await?,
        None => management.clone(),
    };
    info!("Connected to Kubernetes API servers");

    let catalog = VersionCatalog::from_file(&config.catalog)
        .with_context(|| format!("Failed to load catalog {}", config.catalog.display()))?;
    info!(
        "Loaded {} catalog entries from {}",
        catalog.versions.len(),
        config.catalog.display()
    );

    let cluster = KubeCluster::new(management, &config.namespace, config.cluster.clone());
    let nodes = KubeNodes::new(target, config.pool_label.clone());
    let workloads = KubeWorkloads::new(seed.clone());

    let current = cluster.get_cluster().await?;
    info!(
        "Cluster {} runs control plane {} with {} worker pool(s)",
        current.name,
        current.control_plane,
        current.workers.len()
    );

    let mut workflow = UpgradeWorkflow::new(
        &cluster,
        &nodes,
        &workloads,
        &catalog,
        config.workflow.clone(),
    );
    if current.high_availability {
        let token = match config.apiserver_token.clone() {
            Some(token) => token,
            None => fetch_apiserver_auth_token(&seed, &current.control_plane_namespace).await?,
        };
        workflow = workflow.with_auth_token(token);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling upgrade");
            on_signal.cancel();
        }
    });

    let outcome = workflow
        .run_upgrade(
            &current,
            config.control_plane_version.as_deref(),
            config.worker_pool_version.as_deref(),
            &cancel,
        )
        .await?;

    match outcome {
        UpgradeOutcome::Upgraded(plan) => info!("Upgraded {}: {}", current.name, plan),
        UpgradeOutcome::Skipped(reason) => info!("No upgrade performed: {}", reason),
    }
    Ok(())
}
