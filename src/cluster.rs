//! Cluster version model and the collaborator traits the workflow drives.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A named group of nodes that may pin its own Kubernetes version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    pub name: String,
    /// Override version; `None` means the pool inherits the control plane version.
    pub version: Option<String>,
}

impl WorkerPool {
    pub fn inheriting(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

/// Current version assignments of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterVersionState {
    pub name: String,
    /// Namespace hosting the cluster's control plane components.
    pub control_plane_namespace: String,
    pub control_plane: String,
    pub high_availability: bool,
    pub workers: Vec<WorkerPool>,
}

impl ClusterVersionState {
    /// Version a pool runs: its override, or the control plane version.
    pub fn effective_pool_version<'a>(&'a self, pool: &'a WorkerPool) -> &'a str {
        pool.version.as_deref().unwrap_or(&self.control_plane)
    }

    /// Effective version of every declared pool, keyed by pool name.
    pub fn effective_versions(&self) -> BTreeMap<&str, &str> {
        self.workers
            .iter()
            .map(|pool| (pool.name.as_str(), self.effective_pool_version(pool)))
            .collect()
    }
}

/// Runtime versions reported by a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeObservation {
    pub name: String,
    /// Worker pool label; `None` when the node carries no pool label.
    pub pool: Option<String>,
    pub kubelet_version: String,
    pub kube_proxy_version: String,
}

/// Read and write access to the cluster's declarative version fields.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Read the current version assignments.
    async fn get_cluster(&self) -> Result<ClusterVersionState>;

    /// Submit new versions. `control_plane: None` leaves it untouched; only
    /// pools named in `pool_versions` are changed.
    async fn patch_cluster_versions(
        &self,
        control_plane: Option<&str>,
        pool_versions: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Block until the submitted change is fully rolled out.
    async fn wait_for_reconciled(&self, timeout: Duration, cancel: &CancellationToken)
    -> Result<()>;
}

/// Live view of the nodes and API server of the upgraded cluster.
#[async_trait]
pub trait NodeInventory: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeObservation>>;

    /// Version reported by the API server, e.g. `v1.25.4`.
    async fn server_version(&self) -> Result<String>;
}
