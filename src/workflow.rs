//! End-to-end upgrade run: plan, probe, apply, verify, check, tear down.

use std::time::Duration;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::VersionCatalog;
use crate::cluster::{ClusterApi, ClusterVersionState, NodeInventory};
use crate::error::{Result, UpgradeError};
use crate::executor::{DEFAULT_RECONCILE_TIMEOUT, UpgradeExecutor};
use crate::planner::{self, UpgradePlan};
use crate::poll::{self, DEFAULT_POLL_INTERVAL, PollStatus};
use crate::validator::{WorkloadApi, ZeroDowntimeValidator};
use crate::verifier::VersionVerifier;

/// Condition name used while waiting for nodes to report the new versions.
pub const CONVERGENCE_CONDITION: &str = "node versions converged";

/// Default probe image; needs `sh` and `curl`.
pub const DEFAULT_PROBE_IMAGE: &str = "curlimages/curl:8.10.1";

/// Tunables of an upgrade run.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub probe_label: String,
    pub probe_image: String,
    pub probe_ready_timeout: Duration,
    pub reconcile_timeout: Duration,
    pub convergence_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            probe_label: "update".to_string(),
            probe_image: DEFAULT_PROBE_IMAGE.to_string(),
            probe_ready_timeout: Duration::from_secs(60),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            convergence_timeout: Duration::from_secs(5 * 60),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The plan was applied and verified.
    Upgraded(UpgradePlan),
    /// Nothing to do; carries the reason.
    Skipped(String),
}

/// Wires the planner, validator, executor and verifier together.
pub struct UpgradeWorkflow<'a, C, N, W> {
    cluster: &'a C,
    nodes: &'a N,
    workloads: &'a W,
    catalog: &'a VersionCatalog,
    settings: WorkflowSettings,
    auth_token: Option<SecretString>,
}

impl<'a, C, N, W> UpgradeWorkflow<'a, C, N, W>
where
    C: ClusterApi,
    N: NodeInventory,
    W: WorkloadApi,
{
    pub const fn new(
        cluster: &'a C,
        nodes: &'a N,
        workloads: &'a W,
        catalog: &'a VersionCatalog,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            cluster,
            nodes,
            workloads,
            catalog,
            settings,
            auth_token: None,
        }
    }

    /// Token the probe uses against the API server of highly available clusters.
    #[must_use]
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// Run one upgrade of `current`.
    ///
    /// Explicit versions override the catalog lookup when non-empty. A run
    /// with nothing to change returns [`UpgradeOutcome::Skipped`].
    pub async fn run_upgrade(
        &self,
        current: &ClusterVersionState,
        explicit_control_plane: Option<&str>,
        explicit_worker_pool: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<UpgradeOutcome> {
        let verifier = VersionVerifier::new(self.nodes);

        info!(
            "Verifying the Kubernetes version of all existing nodes of {} [before update]",
            current.name
        );
        verifier.verify(current).await?;

        info!("Computing new Kubernetes versions for control plane and worker pools");
        let plan = match planner::compute_targets(
            self.catalog,
            current,
            explicit_control_plane,
            explicit_worker_pool,
        ) {
            Ok(plan) => plan,
            Err(e) if e.is_skip() => {
                info!("Skipping upgrade of {}: {}", current.name, e);
                return Ok(UpgradeOutcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if plan.is_empty() {
            let reason = format!("{} already has the desired Kubernetes versions", current.name);
            info!("{}", reason);
            return Ok(UpgradeOutcome::Skipped(reason));
        }

        let expected = plan.resolve(current);

        if !current.high_availability {
            self.upgrade(&plan, &expected, cancel).await?;
            return Ok(UpgradeOutcome::Upgraded(plan));
        }

        let token = self
            .auth_token
            .clone()
            .ok_or_else(|| UpgradeError::MissingAuthToken(current.name.clone()))?;
        let validator = ZeroDowntimeValidator::new(
            self.workloads,
            self.settings.probe_image.clone(),
            self.settings.poll_interval,
        );
        let mut job = validator
            .start(current, &self.settings.probe_label, token)
            .await?;

        let result = async {
            validator
                .await_ready(&mut job, self.settings.probe_ready_timeout, cancel)
                .await?;
            self.upgrade(&plan, &expected, cancel).await?;
            info!("Ensuring there was no downtime while upgrading {}", current.name);
            validator.assert_no_failure(&mut job).await
        }
        .await;

        let teardown = validator.teardown(&mut job).await;
        match (result, teardown) {
            (Err(e), teardown) => {
                if let Err(cleanup) = teardown {
                    warn!("Failed to delete probe job {}: {}", job.name, cleanup);
                }
                Err(e)
            }
            (Ok(()), Err(cleanup)) => Err(cleanup),
            (Ok(()), Ok(())) => Ok(UpgradeOutcome::Upgraded(plan)),
        }
    }

    /// Apply the plan, then wait until every node reports the expected versions.
    async fn upgrade(
        &self,
        plan: &UpgradePlan,
        expected: &ClusterVersionState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Updating cluster {}", expected.name);
        UpgradeExecutor::new(self.cluster, self.settings.reconcile_timeout)
            .apply(plan, cancel)
            .await?;

        info!(
            "Verifying the Kubernetes version of all existing nodes of {} [after update]",
            expected.name
        );
        let verifier = VersionVerifier::new(self.nodes);
        poll::poll(
            CONVERGENCE_CONDITION,
            self.settings.poll_interval,
            self.settings.convergence_timeout,
            cancel,
            || async {
                match verifier.verify(expected).await {
                    Ok(()) => Ok(PollStatus::Done),
                    Err(e) if e.is_version_mismatch() => Ok(PollStatus::NotYet(e.to_string())),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }
}
