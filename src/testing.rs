//! In-memory collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, ClusterVersionState, NodeInventory, NodeObservation, WorkerPool};
use crate::error::{Result, UpgradeError};
use crate::validator::{PodStatus, ProbeJob, ProbeSpec, WorkloadApi};
use crate::version;

/// Cluster with control plane 1.24.0, an inheriting pool and a pinned pool.
pub fn cluster_state() -> ClusterVersionState {
    ClusterVersionState {
        name: "dev".to_string(),
        control_plane_namespace: "shoot--dev".to_string(),
        control_plane: "1.24.0".to_string(),
        high_availability: false,
        workers: vec![
            WorkerPool::inheriting("default"),
            WorkerPool::pinned("a", "1.24.0"),
            WorkerPool::pinned("b", "1.23.0"),
        ],
    }
}

/// Nodes matching `state`, one per pool.
pub fn nodes_for(state: &ClusterVersionState) -> Vec<NodeObservation> {
    state
        .workers
        .iter()
        .map(|pool| {
            let reported = version::runtime_version(state.effective_pool_version(pool))
                .unwrap_or_default();
            NodeObservation {
                name: format!("{}-0", pool.name),
                pool: Some(pool.name.clone()),
                kubelet_version: reported.clone(),
                kube_proxy_version: reported,
            }
        })
        .collect()
}

/// Fake cluster, node inventory and workload API sharing one state.
pub struct FakeCluster {
    state: Mutex<ClusterVersionState>,
    frozen_nodes: Mutex<Option<Vec<NodeObservation>>>,
    converge_after_lists: Mutex<Option<usize>>,
    pod_ready_after: Option<usize>,
    pod_polls: AtomicUsize,
    probe_failures: i32,
    reconcile_failure: Option<String>,
    delete_failure: Option<String>,
    jobs: Mutex<Vec<String>>,
    created: AtomicUsize,
    deleted: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new(state: ClusterVersionState) -> Self {
        Self {
            state: Mutex::new(state),
            frozen_nodes: Mutex::new(None),
            converge_after_lists: Mutex::new(None),
            pod_ready_after: Some(1),
            pod_polls: AtomicUsize::new(0),
            probe_failures: 0,
            reconcile_failure: None,
            delete_failure: None,
            jobs: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pod_ready_after(mut self, polls: usize) -> Self {
        self.pod_ready_after = Some(polls);
        self
    }

    pub fn with_pod_never_ready(mut self) -> Self {
        self.pod_ready_after = None;
        self
    }

    pub const fn with_probe_failures(mut self, failures: i32) -> Self {
        self.probe_failures = failures;
        self
    }

    pub fn with_reconcile_failure(mut self, reason: &str) -> Self {
        self.reconcile_failure = Some(reason.to_string());
        self
    }

    /// Deleting a workload fails with an API error.
    pub fn with_delete_failure(mut self, reason: &str) -> Self {
        self.delete_failure = Some(reason.to_string());
        self
    }

    /// Nodes keep reporting these observations regardless of the spec.
    pub fn with_nodes(self, nodes: Vec<NodeObservation>) -> Self {
        *self.frozen_nodes.lock().unwrap() = Some(nodes);
        self
    }

    /// After the next patch, nodes report the old versions for `lists` listings.
    pub fn with_lagging_nodes(self, lists: usize) -> Self {
        *self.converge_after_lists.lock().unwrap() = Some(lists);
        self
    }

    pub fn state(&self) -> ClusterVersionState {
        self.state.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn probes_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn probes_deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_cluster(&self) -> Result<ClusterVersionState> {
        Ok(self.state())
    }

    async fn patch_cluster_versions(
        &self,
        control_plane: Option<&str>,
        pool_versions: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.clone();
        if let Some(version) = control_plane {
            state.control_plane = version.to_string();
        }
        for pool in &mut state.workers {
            if let Some(version) = pool_versions.get(&pool.name) {
                pool.version = Some(version.clone());
            }
        }
        drop(state);

        if self.converge_after_lists.lock().unwrap().is_some() {
            let mut frozen = self.frozen_nodes.lock().unwrap();
            if frozen.is_none() {
                *frozen = Some(nodes_for(&before));
            }
        }

        self.record("patch");
        Ok(())
    }

    async fn wait_for_reconciled(
        &self,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(UpgradeError::Cancelled("cluster reconciled".to_string()));
        }
        if let Some(reason) = &self.reconcile_failure {
            return Err(UpgradeError::ReconcileFailed {
                cluster: self.state().name,
                reason: reason.clone(),
            });
        }
        self.record("reconciled");
        Ok(())
    }
}

#[async_trait]
impl NodeInventory for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeObservation>> {
        let mut lag = self.converge_after_lists.lock().unwrap();
        if let Some(remaining) = *lag {
            let frozen = self.frozen_nodes.lock().unwrap().clone();
            if let Some(nodes) = frozen {
                if remaining == 0 {
                    *lag = None;
                    *self.frozen_nodes.lock().unwrap() = None;
                } else {
                    *lag = Some(remaining - 1);
                    return Ok(nodes);
                }
            }
        }
        drop(lag);

        if let Some(nodes) = self.frozen_nodes.lock().unwrap().clone() {
            return Ok(nodes);
        }
        Ok(nodes_for(&self.state()))
    }

    async fn server_version(&self) -> Result<String> {
        version::runtime_version(&self.state().control_plane)
    }
}

#[async_trait]
impl WorkloadApi for FakeCluster {
    async fn create_probe_workload(&self, spec: &ProbeSpec) -> Result<ProbeJob> {
        self.jobs.lock().unwrap().push(spec.name.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        self.record("create-probe");
        Ok(ProbeJob::created(spec.name.clone(), spec.namespace.clone()))
    }

    async fn pods_for_workload(&self, job: &ProbeJob) -> Result<Vec<PodStatus>> {
        let polls = self.pod_polls.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = self.pod_ready_after.is_some_and(|after| polls >= after);
        if polls == 1 && !ready {
            return Ok(Vec::new());
        }
        Ok(vec![PodStatus {
            name: format!("{}-x7k2p", job.name),
            ready,
        }])
    }

    async fn failure_count(&self, _job: &ProbeJob) -> Result<i32> {
        Ok(self.probe_failures)
    }

    async fn delete_workload(&self, job: &ProbeJob) -> Result<()> {
        if let Some(reason) = &self.delete_failure {
            return Err(UpgradeError::KubernetesApi(format!("job {}: {reason}", job.name)));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let Some(idx) = jobs.iter().position(|name| *name == job.name) else {
            return Err(UpgradeError::NotFound(format!("job {}", job.name)));
        };
        jobs.remove(idx);
        drop(jobs);

        self.deleted.fetch_add(1, Ordering::SeqCst);
        self.record("delete-probe");
        Ok(())
    }
}
