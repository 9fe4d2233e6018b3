//! Custom error types for kvup.

use std::time::Duration;

use thiserror::Error;

use crate::validator::ProbeState;

/// Runtime version field reported by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    Kubelet,
    KubeProxy,
}

impl std::fmt::Display for VersionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubelet => write!(f, "kubelet"),
            Self::KubeProxy => write!(f, "kube-proxy"),
        }
    }
}

/// Errors that can occur during a version upgrade run.
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("No consecutive minor version available for {0}")]
    NoUpgradeAvailable(String),

    #[error("{field} version of pool {pool:?} is {got:?} but expected {want:?}")]
    VersionMismatch {
        pool: String,
        field: VersionField,
        got: String,
        want: String,
    },

    #[error("Control plane version is {got:?} but expected {want:?}")]
    ControlPlaneMismatch { got: String, want: String },

    #[error("Node {node} belongs to pool {pool:?} which is not declared in the cluster spec")]
    UnknownNodePool { node: String, pool: String },

    #[error("Zero-downtime validator job {job} recorded {failures} failure(s) during the upgrade")]
    UpgradeDowntimeDetected { job: String, failures: i32 },

    #[error("Timed out after {timeout:?} waiting for {condition} (last observed: {last_observed})")]
    Timeout {
        condition: String,
        last_observed: String,
        timeout: Duration,
    },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Invalid version catalog: {0}")]
    InvalidCatalog(String),

    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("Reconciliation of cluster {cluster} failed: {reason}")]
    ReconcileFailed { cluster: String, reason: String },

    #[error("Probe job {job} is {state}, cannot {action}")]
    InvalidProbeState {
        job: String,
        state: ProbeState,
        action: &'static str,
    },

    #[error("API server auth token required to probe highly available cluster {0}")]
    MissingAuthToken(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Kubernetes API error: {0}")]
    KubernetesApi(String),
}

impl UpgradeError {
    /// Wrap a kube client error with the operation that produced it.
    /// HTTP 404 answers become `NotFound` so callers can tell absence apart.
    pub fn kube(context: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref e) if e.code == 404 => Self::NotFound(context.to_string()),
            other => Self::KubernetesApi(format!("{context}: {other}")),
        }
    }

    /// Returns true if the error means "nothing to upgrade" rather than a failure.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::NoUpgradeAvailable(_))
    }

    /// Returns true if the error is a node or control plane version mismatch.
    pub const fn is_version_mismatch(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::ControlPlaneMismatch { .. }
        )
    }
}

pub type Result<T, E = UpgradeError> = std::result::Result<T, E>;
