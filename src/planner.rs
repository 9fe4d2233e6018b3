//! Upgrade planning: computes target versions for the control plane and
//! every worker pool that pins its own version.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::catalog::VersionCatalog;
use crate::cluster::{ClusterVersionState, WorkerPool};
use crate::error::{Result, UpgradeError};

/// Target versions for one upgrade run.
///
/// `control_plane` is `None` when the control plane stays where it is.
/// `pools` only holds pools whose target differs from their current override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradePlan {
    control_plane: Option<String>,
    pools: BTreeMap<String, String>,
}

impl UpgradePlan {
    pub fn control_plane(&self) -> Option<&str> {
        self.control_plane.as_deref()
    }

    pub const fn pools(&self) -> &BTreeMap<String, String> {
        &self.pools
    }

    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.control_plane.is_none() && self.pools.is_empty()
    }

    /// The cluster state expected once this plan has been rolled out.
    pub fn resolve(&self, current: &ClusterVersionState) -> ClusterVersionState {
        let mut resolved = current.clone();
        if let Some(control_plane) = &self.control_plane {
            resolved.control_plane.clone_from(control_plane);
        }
        for pool in &mut resolved.workers {
            if let Some(target) = self.pools.get(&pool.name) {
                pool.version = Some(target.clone());
            }
        }
        resolved
    }
}

impl std::fmt::Display for UpgradePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "control plane: {}",
            self.control_plane.as_deref().unwrap_or("unchanged")
        )?;
        for (pool, version) in &self.pools {
            write!(f, ", pool {pool}: {version}")?;
        }
        Ok(())
    }
}

/// Candidate target for a pool before no-op suppression.
struct PoolCandidate<'a> {
    pool: &'a WorkerPool,
    current: &'a str,
    target: Option<String>,
}

/// Compute the next versions for a cluster.
///
/// Explicit versions win when supplied and non-empty; otherwise the next
/// consecutive minor version is looked up in `catalog`. Pools that pin the
/// current control plane version follow the control plane target instead of
/// being advanced on their own.
pub fn compute_targets(
    catalog: &VersionCatalog,
    current: &ClusterVersionState,
    explicit_control_plane: Option<&str>,
    explicit_worker_pool: Option<&str>,
) -> Result<UpgradePlan> {
    let control_plane_target = match non_empty(explicit_control_plane) {
        Some(version) => version.to_string(),
        None => next_minor(catalog, &current.control_plane)?,
    };
    let control_plane_target =
        (control_plane_target != current.control_plane).then_some(control_plane_target);

    let mut candidates = Vec::with_capacity(current.workers.len());
    for pool in &current.workers {
        let Some(pinned) = pool.version.as_deref() else {
            continue;
        };

        let target = if pinned == current.control_plane {
            control_plane_target.clone()
        } else {
            Some(match non_empty(explicit_worker_pool) {
                Some(version) => version.to_string(),
                None => next_minor(catalog, pinned)?,
            })
        };

        candidates.push(PoolCandidate {
            pool,
            current: pinned,
            target,
        });
    }

    let pools = candidates
        .into_iter()
        .filter_map(|c| match c.target {
            Some(target) if target != c.current => Some((c.pool.name.clone(), target)),
            _ => {
                debug!("Pool {} already at desired version {}", c.pool.name, c.current);
                None
            }
        })
        .collect();

    let plan = UpgradePlan {
        control_plane: control_plane_target,
        pools,
    };
    info!("Computed upgrade plan for {}: {}", current.name, plan);
    Ok(plan)
}

fn non_empty(version: Option<&str>) -> Option<&str> {
    version.filter(|v| !v.is_empty())
}

fn next_minor(catalog: &VersionCatalog, current: &str) -> Result<String> {
    catalog
        .next_minor_version(current)?
        .ok_or_else(|| UpgradeError::NoUpgradeAvailable(current.to_string()))
}
