//! `ClusterApi` backed by the `ManagedCluster` custom resource.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::Api;
use kube::api::{Patch, PatchParams};
use kube::runtime::wait::await_condition;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cluster::{ClusterApi, ClusterVersionState, WorkerPool};
use crate::crd::{ManagedCluster, OperationState, Worker, WorkerKubernetes};
use crate::error::{Result, UpgradeError};

const FIELD_MANAGER: &str = "kvup";
const RECONCILED_CONDITION: &str = "cluster reconciled";

/// A single `ManagedCluster` object on the management cluster.
pub struct KubeCluster {
    api: Api<ManagedCluster>,
    name: String,
}

impl KubeCluster {
    pub fn new(client: kube::Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
        }
    }

    async fn fetch(&self) -> Result<ManagedCluster> {
        self.api
            .get_opt(&self.name)
            .await
            .map_err(|e| UpgradeError::kube(&format!("get cluster {}", self.name), e))?
            .ok_or_else(|| UpgradeError::ClusterNotFound(self.name.clone()))
    }
}

/// Translate the custom resource into the version model.
pub fn version_state(cluster: &ManagedCluster) -> ClusterVersionState {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let control_plane_namespace = cluster
        .status
        .as_ref()
        .and_then(|s| s.technical_id.clone())
        .or_else(|| cluster.metadata.namespace.clone())
        .unwrap_or_default();

    ClusterVersionState {
        name,
        control_plane_namespace,
        control_plane: cluster.spec.kubernetes.version.clone(),
        high_availability: cluster.spec.is_high_availability(),
        workers: cluster
            .spec
            .workers
            .iter()
            .map(|w| match w.kubernetes.as_ref().and_then(|k| k.version.clone()) {
                Some(version) => WorkerPool::pinned(w.name.clone(), version),
                None => WorkerPool::inheriting(w.name.clone()),
            })
            .collect(),
    }
}

/// Apply new versions to a copy of the worker list.
fn patched_workers(workers: &[Worker], pool_versions: &BTreeMap<String, String>) -> Vec<Worker> {
    workers
        .iter()
        .map(|w| {
            let mut worker = w.clone();
            if let Some(version) = pool_versions.get(&w.name) {
                worker
                    .kubernetes
                    .get_or_insert_with(WorkerKubernetes::default)
                    .version = Some(version.clone());
            }
            worker
        })
        .collect()
}

/// True once the reconciler has acted on the latest generation and the
/// operation is finished, successfully or not.
fn reconcile_finished(cluster: &ManagedCluster) -> bool {
    let generation = cluster.metadata.generation.unwrap_or_default();
    let Some(status) = cluster.status.as_ref() else {
        return false;
    };
    if status.observed_generation < generation {
        return false;
    }
    status.last_operation.as_ref().is_some_and(|op| {
        matches!(op.state, OperationState::Succeeded | OperationState::Failed)
    })
}

/// Short description of the reconcile progress, used in timeout errors.
fn describe_operation(cluster: &ManagedCluster) -> String {
    let generation = cluster.metadata.generation.unwrap_or_default();
    match cluster.status.as_ref() {
        None => "no status reported".to_string(),
        Some(status) => match &status.last_operation {
            None => format!(
                "observed generation {}/{}, no operation",
                status.observed_generation, generation
            ),
            Some(op) => format!(
                "observed generation {}/{}, {} {} ({}%)",
                status.observed_generation, generation, op.r#type, op.state, op.progress
            ),
        },
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_cluster(&self) -> Result<ClusterVersionState> {
        let cluster = self.fetch().await?;
        Ok(version_state(&cluster))
    }

    async fn patch_cluster_versions(
        &self,
        control_plane: Option<&str>,
        pool_versions: &BTreeMap<String, String>,
    ) -> Result<()> {
        let cluster = self.fetch().await?;

        let mut spec = json!({
            "workers": patched_workers(&cluster.spec.workers, pool_versions),
        });
        if let Some(version) = control_plane {
            spec["kubernetes"] = json!({ "version": version });
        }

        // Carrying the read resourceVersion turns a concurrent write into a 409.
        let patch = json!({
            "metadata": { "resourceVersion": cluster.metadata.resource_version },
            "spec": spec,
        });

        let patched = self
            .api
            .patch(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| UpgradeError::kube(&format!("patch cluster {}", self.name), e))?;

        debug!(
            "Patched cluster {} to generation {}",
            self.name,
            patched.metadata.generation.unwrap_or_default()
        );
        Ok(())
    }

    async fn wait_for_reconciled(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let wait = tokio::time::timeout(
            timeout,
            await_condition(self.api.clone(), &self.name, |obj: Option<&ManagedCluster>| {
                obj.is_some_and(reconcile_finished)
            }),
        );

        let finished = tokio::select! {
            () = cancel.cancelled() => {
                return Err(UpgradeError::Cancelled(RECONCILED_CONDITION.to_string()));
            }
            res = wait => res,
        };

        let cluster = match finished {
            Ok(Ok(Some(cluster))) => cluster,
            Ok(Ok(None)) => return Err(UpgradeError::ClusterNotFound(self.name.clone())),
            Ok(Err(e)) => {
                return Err(UpgradeError::KubernetesApi(format!(
                    "watch cluster {}: {e}",
                    self.name
                )));
            }
            Err(_) => {
                let last_observed = match self.fetch().await {
                    Ok(cluster) => describe_operation(&cluster),
                    Err(e) => e.to_string(),
                };
                return Err(UpgradeError::Timeout {
                    condition: RECONCILED_CONDITION.to_string(),
                    last_observed,
                    timeout,
                });
            }
        };

        match cluster.status.as_ref().and_then(|s| s.last_operation.as_ref()) {
            Some(op) if op.state == OperationState::Failed => Err(UpgradeError::ReconcileFailed {
                cluster: self.name.clone(),
                reason: op.description.clone(),
            }),
            _ => {
                info!("Cluster {} reconciled", self.name);
                Ok(())
            }
        }
    }
}
