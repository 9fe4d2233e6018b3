//! CLI configuration and argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::SecretString;

use crate::k8s::DEFAULT_POOL_LABEL;
use crate::workflow::{DEFAULT_PROBE_IMAGE, WorkflowSettings};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Upgrade a cluster to the next consecutive Kubernetes minor version.
///
/// Reads the cluster's version spec, computes targets from the version
/// catalog, applies them and verifies every node, optionally probing the
/// API server for downtime while the control plane rolls.
#[derive(Parser, Debug, Clone)]
#[command(name = "kvup")]
#[command(about = "Kubernetes version upgrade runner with zero-downtime validation")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Name of the ManagedCluster resource
    #[arg(short, long, env = "KVUP_CLUSTER")]
    pub cluster: String,

    /// Namespace of the ManagedCluster resource
    #[arg(short, long, default_value = "default", env = "KVUP_NAMESPACE")]
    pub namespace: String,

    /// Version catalog file (YAML)
    #[arg(long, env = "KVUP_CATALOG")]
    pub catalog: PathBuf,

    /// Kubeconfig of the management cluster (defaults to KUBECONFIG / in-cluster)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig of the upgraded cluster, used to read node versions
    #[arg(long, env = "KVUP_TARGET_KUBECONFIG")]
    pub target_kubeconfig: PathBuf,

    /// Kubeconfig of the cluster hosting the control plane (defaults to the management cluster)
    #[arg(long, env = "KVUP_SEED_KUBECONFIG")]
    pub seed_kubeconfig: Option<PathBuf>,

    /// Target control plane version (e.g., 1.25.4); catalog lookup when omitted
    #[arg(long)]
    pub control_plane_version: Option<String>,

    /// Target version for pools pinned below the control plane
    #[arg(long)]
    pub worker_pool_version: Option<String>,

    /// Suffix of the zero-downtime validator job name
    #[arg(long, default_value = "update")]
    pub probe_label: String,

    /// Container image of the zero-downtime validator (needs sh and curl)
    #[arg(long, default_value = DEFAULT_PROBE_IMAGE)]
    pub probe_image: String,

    /// API server auth token; read from the kube-apiserver deployment when omitted
    #[arg(long, env = "KVUP_APISERVER_TOKEN", hide_env_values = true)]
    pub apiserver_token: Option<String>,

    /// Seconds to wait for the validator pod to become ready
    #[arg(long, default_value = "60")]
    pub probe_ready_timeout: u64,

    /// Seconds to wait for the cluster to reconcile the new versions
    #[arg(long, default_value = "3600")]
    pub reconcile_timeout: u64,

    /// Seconds to wait for all nodes to report the new versions
    #[arg(long, default_value = "300")]
    pub convergence_timeout: u64,

    /// Seconds between readiness and convergence checks
    #[arg(long, default_value = "1")]
    pub poll_interval: u64,

    /// Node label carrying the worker pool name
    #[arg(long, default_value = DEFAULT_POOL_LABEL)]
    pub pool_label: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "KVUP_LOG_LEVEL")]
    pub log_level: String,

    /// Log format
    #[arg(long, value_enum, default_value = "text", env = "KVUP_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster: String,
    pub namespace: String,
    pub catalog: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub target_kubeconfig: PathBuf,
    pub seed_kubeconfig: Option<PathBuf>,
    pub control_plane_version: Option<String>,
    pub worker_pool_version: Option<String>,
    pub apiserver_token: Option<SecretString>,
    pub pool_label: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub workflow: WorkflowSettings,
}

/// Treat `--flag ""` like an omitted flag.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        let workflow = WorkflowSettings {
            probe_label: args.probe_label,
            probe_image: args.probe_image,
            probe_ready_timeout: Duration::from_secs(args.probe_ready_timeout),
            reconcile_timeout: Duration::from_secs(args.reconcile_timeout),
            convergence_timeout: Duration::from_secs(args.convergence_timeout),
            poll_interval: Duration::from_secs(args.poll_interval.max(1)),
        };

        Self {
            cluster: args.cluster,
            namespace: args.namespace,
            catalog: args.catalog,
            kubeconfig: args.kubeconfig,
            target_kubeconfig: args.target_kubeconfig,
            seed_kubeconfig: args.seed_kubeconfig,
            control_plane_version: non_empty(args.control_plane_version),
            worker_pool_version: non_empty(args.worker_pool_version),
            apiserver_token: non_empty(args.apiserver_token).map(SecretString::from),
            pool_label: args.pool_label,
            log_level: args.log_level,
            log_format: args.log_format,
            workflow,
        }
    }
}
