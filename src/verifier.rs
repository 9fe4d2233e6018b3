//! Verifies that the API server and every node run the expected versions.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::cluster::{ClusterVersionState, NodeInventory};
use crate::error::{Result, UpgradeError, VersionField};
use crate::version;

pub struct VersionVerifier<'a, N> {
    nodes: &'a N,
}

impl<'a, N: NodeInventory> VersionVerifier<'a, N> {
    pub const fn new(nodes: &'a N) -> Self {
        Self { nodes }
    }

    /// Compare live versions against `expected`.
    ///
    /// Returns the first mismatch found. Runs exactly once; wrap it with
    /// [`crate::poll::poll`] to wait for convergence.
    pub async fn verify(&self, expected: &ClusterVersionState) -> Result<()> {
        let want_control_plane = version::runtime_version(&expected.control_plane)?;
        let got_control_plane = self.nodes.server_version().await?;
        if got_control_plane != want_control_plane {
            return Err(UpgradeError::ControlPlaneMismatch {
                got: got_control_plane,
                want: want_control_plane,
            });
        }

        let mut pool_versions = BTreeMap::new();
        for (pool, effective) in expected.effective_versions() {
            pool_versions.insert(pool, version::runtime_version(effective)?);
        }

        let nodes = self.nodes.list_nodes().await?;
        debug!("Verifying versions of {} nodes", nodes.len());

        for node in &nodes {
            let pool = node.pool.as_deref().unwrap_or_default();
            let want = pool_versions
                .get(pool)
                .ok_or_else(|| UpgradeError::UnknownNodePool {
                    node: node.name.clone(),
                    pool: pool.to_string(),
                })?;

            for (field, got) in [
                (VersionField::Kubelet, &node.kubelet_version),
                (VersionField::KubeProxy, &node.kube_proxy_version),
            ] {
                if got != want {
                    return Err(UpgradeError::VersionMismatch {
                        pool: pool.to_string(),
                        field,
                        got: got.clone(),
                        want: want.clone(),
                    });
                }
            }
        }

        info!(
            "All {} nodes of {} run the expected Kubernetes versions",
            nodes.len(),
            expected.name
        );
        Ok(())
    }
}
