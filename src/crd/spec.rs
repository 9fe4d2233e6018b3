//! `ManagedCluster` spec types.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::ManagedClusterStatus;

/// `ManagedCluster` declares the desired Kubernetes versions of a cluster.
///
/// Only the fields the upgrade workflow reads or writes are modelled; the
/// reconciler owning the resource may carry more.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kvup.io",
    version = "v1alpha1",
    kind = "ManagedCluster",
    namespaced,
    status = "ManagedClusterStatus",
    shortname = "mc",
    printcolumn = r#"{"name":"VERSION","type":"string","jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"OPERATION","type":"string","jsonPath":".status.lastOperation.type"}"#,
    printcolumn = r#"{"name":"STATE","type":"string","jsonPath":".status.lastOperation.state"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Control plane Kubernetes settings.
    pub kubernetes: KubernetesSettings,

    /// Worker pools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<Worker>,

    /// Control plane topology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlane>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSettings {
    /// Control plane Kubernetes version (e.g., "1.31.2").
    pub version: String,
}

/// A worker pool.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,

    /// Pool-level Kubernetes settings. Unset means the pool follows the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<WorkerKubernetes>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerKubernetes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlane {
    /// Present when the control plane runs highly available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    pub failure_tolerance_type: FailureToleranceType,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum FailureToleranceType {
    #[serde(rename = "node")]
    Node,
    #[serde(rename = "zone")]
    Zone,
}

impl ManagedClusterSpec {
    /// Returns true if the control plane is configured for high availability.
    pub fn is_high_availability(&self) -> bool {
        self.control_plane
            .as_ref()
            .is_some_and(|cp| cp.high_availability.is_some())
    }
}
