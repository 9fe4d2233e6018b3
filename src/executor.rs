//! Applies an upgrade plan to the cluster spec and waits for the rollout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::planner::UpgradePlan;

/// Default budget for the cluster to reconcile a version change.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct UpgradeExecutor<'a, C> {
    cluster: &'a C,
    reconcile_timeout: Duration,
}

impl<'a, C: ClusterApi> UpgradeExecutor<'a, C> {
    pub const fn new(cluster: &'a C, reconcile_timeout: Duration) -> Self {
        Self {
            cluster,
            reconcile_timeout,
        }
    }

    /// Submit the planned versions and block until they are rolled out.
    ///
    /// No-op entries are expected to be filtered by the planner already.
    pub async fn apply(&self, plan: &UpgradePlan, cancel: &CancellationToken) -> Result<()> {
        if let Some(version) = plan.control_plane() {
            info!("Updating .spec.kubernetes.version to {}", version);
        }
        for (pool, version) in plan.pools() {
            info!("Updating .kubernetes.version to {} for pool {}", version, pool);
        }

        self.cluster
            .patch_cluster_versions(plan.control_plane(), plan.pools())
            .await?;

        info!(
            "Waiting up to {:?} for the cluster to be reconciled",
            self.reconcile_timeout
        );
        self.cluster
            .wait_for_reconciled(self.reconcile_timeout, cancel)
            .await?;

        info!("Cluster reconciled with {}", plan);
        Ok(())
    }
}
