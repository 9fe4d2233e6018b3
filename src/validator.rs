//! Zero-downtime validation.
//!
//! A small probe job hammers the API server health endpoint for the whole
//! upgrade window and fails on the first unsuccessful answer. Its lifecycle is
//! an explicit state machine: `Created -> Ready -> Checked`, with `Deleted`
//! reachable from every state through best-effort teardown.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterVersionState;
use crate::error::{Result, UpgradeError};
use crate::poll::{self, PollStatus};

/// Name prefix of probe jobs.
pub const PROBE_NAME_PREFIX: &str = "zero-downtime-validator";

/// Condition name used when waiting for the probe pod.
pub const POD_READY_CONDITION: &str = "pod ready";

/// Lifecycle state of a probe job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Created,
    Ready,
    Checked,
    Deleted,
}

impl std::fmt::Display for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Ready => write!(f, "Ready"),
            Self::Checked => write!(f, "Checked"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Handle to a probe job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeJob {
    pub name: String,
    pub namespace: String,
    state: ProbeState,
}

impl ProbeJob {
    /// Handle for a freshly created job.
    pub fn created(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            state: ProbeState::Created,
        }
    }

    #[cfg(test)]
    pub const fn state(&self) -> ProbeState {
        self.state
    }

    fn expect_state(&self, allowed: &[ProbeState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(UpgradeError::InvalidProbeState {
            job: self.name.clone(),
            state: self.state,
            action,
        })
    }

    fn transition(&mut self, next: ProbeState) {
        debug!("Probe job {} {} -> {}", self.name, self.state, next);
        self.state = next;
    }
}

/// Everything needed to create a probe workload.
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub name: String,
    pub namespace: String,
    pub label: String,
    pub image: String,
    pub auth_token: SecretString,
}

/// Readiness of a pod belonging to a probe workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub name: String,
    pub ready: bool,
}

/// Lifecycle operations on the probe workload.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    async fn create_probe_workload(&self, spec: &ProbeSpec) -> Result<ProbeJob>;

    async fn pods_for_workload(&self, job: &ProbeJob) -> Result<Vec<PodStatus>>;

    /// Number of failures recorded by the workload since creation.
    async fn failure_count(&self, job: &ProbeJob) -> Result<i32>;

    /// Delete the workload. Returns `UpgradeError::NotFound` when already gone.
    async fn delete_workload(&self, job: &ProbeJob) -> Result<()>;
}

/// Drives the probe job through its lifecycle.
pub struct ZeroDowntimeValidator<'a, W> {
    workloads: &'a W,
    image: String,
    poll_interval: Duration,
}

impl<'a, W: WorkloadApi> ZeroDowntimeValidator<'a, W> {
    pub fn new(workloads: &'a W, image: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            workloads,
            image: image.into(),
            poll_interval,
        }
    }

    /// Create the probe job in the cluster's control plane namespace.
    pub async fn start(
        &self,
        cluster: &ClusterVersionState,
        probe_label: &str,
        auth_token: SecretString,
    ) -> Result<ProbeJob> {
        let spec = ProbeSpec {
            name: format!("{PROBE_NAME_PREFIX}-{probe_label}"),
            namespace: cluster.control_plane_namespace.clone(),
            label: probe_label.to_string(),
            image: self.image.clone(),
            auth_token,
        };

        info!(
            "Deploying zero-downtime validator job {}/{} for cluster {}",
            spec.namespace, spec.name, cluster.name
        );
        self.workloads.create_probe_workload(&spec).await
    }

    /// Wait until a pod of the job reports the Ready condition.
    pub async fn await_ready(
        &self,
        job: &mut ProbeJob,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        job.expect_state(&[ProbeState::Created, ProbeState::Ready], "await readiness")?;
        if job.state == ProbeState::Ready {
            return Ok(());
        }

        let workloads = self.workloads;
        let probe: &ProbeJob = job;
        poll::poll(
            POD_READY_CONDITION,
            self.poll_interval,
            timeout,
            cancel,
            || async move {
                let pods = workloads.pods_for_workload(probe).await?;
                Ok(match pods.first() {
                    None => PollStatus::NotYet(format!(
                        "job {} associated pod is not scheduled",
                        probe.name
                    )),
                    Some(pod) if pod.ready => PollStatus::Done,
                    Some(pod) => PollStatus::NotYet(format!("pod {} is not ready", pod.name)),
                })
            },
        )
        .await?;

        info!("Zero-downtime validator job {} is ready", job.name);
        job.transition(ProbeState::Ready);
        Ok(())
    }

    /// Fail if the job recorded any failure since it was created.
    pub async fn assert_no_failure(&self, job: &mut ProbeJob) -> Result<()> {
        job.expect_state(&[ProbeState::Ready, ProbeState::Checked], "check failures")?;

        let failures = self.workloads.failure_count(job).await?;
        job.transition(ProbeState::Checked);

        if failures > 0 {
            warn!(
                "Zero-downtime validator job {} recorded {} failure(s)",
                job.name, failures
            );
            return Err(UpgradeError::UpgradeDowntimeDetected {
                job: job.name.clone(),
                failures,
            });
        }

        info!("No control plane downtime observed by job {}", job.name);
        Ok(())
    }

    /// Delete the job. A job that is already gone is not an error.
    pub async fn teardown(&self, job: &mut ProbeJob) -> Result<()> {
        if job.state == ProbeState::Deleted {
            return Ok(());
        }

        match self.workloads.delete_workload(job).await {
            Ok(()) => info!("Deleted zero-downtime validator job {}", job.name),
            Err(UpgradeError::NotFound(_)) => {
                debug!("Zero-downtime validator job {} already gone", job.name);
            }
            Err(e) => return Err(e),
        }

        job.transition(ProbeState::Deleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCluster, cluster_state};

    const INTERVAL: Duration = Duration::from_millis(5);

    fn token() -> SecretString {
        SecretString::from("probe-token".to_string())
    }

    #[tokio::test]
    async fn test_start_creates_job_in_control_plane_namespace() {
        let fake = FakeCluster::new(cluster_state());
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);

        let job = validator
            .start(&fake.state(), "update", token())
            .await
            .unwrap();

        assert_eq!(job.name, "zero-downtime-validator-update");
        assert_eq!(job.namespace, "shoot--dev");
        assert_eq!(job.state(), ProbeState::Created);
        assert_eq!(fake.probes_created(), 1);
    }

    #[tokio::test]
    async fn test_await_ready_transitions_state() {
        let fake = FakeCluster::new(cluster_state()).with_pod_ready_after(2);
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = validator
            .start(&fake.state(), "update", token())
            .await
            .unwrap();

        validator
            .await_ready(&mut job, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.state(), ProbeState::Ready);
    }

    #[tokio::test]
    async fn test_await_ready_timeout_names_pod_ready() {
        let fake = FakeCluster::new(cluster_state()).with_pod_never_ready();
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = validator
            .start(&fake.state(), "update", token())
            .await
            .unwrap();

        let err = validator
            .await_ready(&mut job, Duration::from_millis(30), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::Timeout { ref condition, .. } if condition == "pod ready"));
        assert_eq!(job.state(), ProbeState::Created);
    }

    #[tokio::test]
    async fn test_assert_no_failure_passes() {
        let fake = FakeCluster::new(cluster_state());
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = ProbeJob::created("zero-downtime-validator-update", "shoot--dev");
        job.transition(ProbeState::Ready);

        validator.assert_no_failure(&mut job).await.unwrap();
        assert_eq!(job.state(), ProbeState::Checked);
    }

    #[tokio::test]
    async fn test_assert_no_failure_detects_downtime() {
        let fake = FakeCluster::new(cluster_state()).with_probe_failures(1);
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = ProbeJob::created("zero-downtime-validator-update", "shoot--dev");
        job.transition(ProbeState::Ready);

        let err = validator.assert_no_failure(&mut job).await.unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::UpgradeDowntimeDetected { ref job, failures: 1 } if job == "zero-downtime-validator-update"
        ));
    }

    #[tokio::test]
    async fn test_assert_no_failure_requires_ready() {
        let fake = FakeCluster::new(cluster_state());
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = ProbeJob::created("zero-downtime-validator-update", "shoot--dev");

        let err = validator.assert_no_failure(&mut job).await.unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::InvalidProbeState {
                state: ProbeState::Created,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_teardown_ignores_missing_job() {
        let fake = FakeCluster::new(cluster_state());
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = ProbeJob::created("zero-downtime-validator-gone", "shoot--dev");

        validator.teardown(&mut job).await.unwrap();
        assert_eq!(job.state(), ProbeState::Deleted);

        // Second teardown is a no-op.
        validator.teardown(&mut job).await.unwrap();
        assert_eq!(fake.probes_deleted(), 0);
    }

    #[tokio::test]
    async fn test_teardown_deletes_created_job() {
        let fake = FakeCluster::new(cluster_state());
        let validator = ZeroDowntimeValidator::new(&fake, "curlimages/curl", INTERVAL);
        let mut job = validator
            .start(&fake.state(), "update", token())
            .await
            .unwrap();

        validator.teardown(&mut job).await.unwrap();
        assert_eq!(job.state(), ProbeState::Deleted);
        assert_eq!(fake.probes_deleted(), 1);
    }
}
