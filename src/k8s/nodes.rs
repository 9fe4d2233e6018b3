//! `NodeInventory` backed by the upgraded cluster's API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::Api;
use kube::api::ListParams;
use tracing::debug;

use crate::cluster::{NodeInventory, NodeObservation};
use crate::error::{Result, UpgradeError};

/// Node label carrying the worker pool name.
pub const DEFAULT_POOL_LABEL: &str = "worker.gardener.cloud/pool";

pub struct KubeNodes {
    client: kube::Client,
    pool_label: String,
}

impl KubeNodes {
    pub fn new(client: kube::Client, pool_label: impl Into<String>) -> Self {
        Self {
            client,
            pool_label: pool_label.into(),
        }
    }
}

fn observe(node: &Node, pool_label: &str) -> NodeObservation {
    let info = node.status.as_ref().and_then(|s| s.node_info.as_ref());
    NodeObservation {
        name: node.metadata.name.clone().unwrap_or_default(),
        pool: node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(pool_label).cloned()),
        kubelet_version: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
        kube_proxy_version: info
            .map(|i| i.kube_proxy_version.clone())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl NodeInventory for KubeNodes {
    async fn list_nodes(&self) -> Result<Vec<NodeObservation>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| UpgradeError::kube("list nodes", e))?;

        debug!("Found {} nodes", list.items.len());
        Ok(list
            .items
            .iter()
            .map(|node| observe(node, &self.pool_label))
            .collect())
    }

    async fn server_version(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| UpgradeError::kube("get server version", e))?;
        Ok(info.git_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{NodeStatus, NodeSystemInfo};
    use kube::api::ObjectMeta;

    fn node(labels: Option<BTreeMap<String, String>>, kubelet: &str, kube_proxy: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("ip-10-0-1-12".to_string()),
                labels,
                ..Default::default()
            },
            status: Some(NodeStatus {
                node_info: Some(NodeSystemInfo {
                    kubelet_version: kubelet.to_string(),
                    kube_proxy_version: kube_proxy.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_observe_reads_pool_and_versions() {
        let labels = BTreeMap::from([(DEFAULT_POOL_LABEL.to_string(), "cpu".to_string())]);
        let obs = observe(&node(Some(labels), "v1.24.3", "v1.24.2"), DEFAULT_POOL_LABEL);
        assert_eq!(obs.name, "ip-10-0-1-12");
        assert_eq!(obs.pool.as_deref(), Some("cpu"));
        assert_eq!(obs.kubelet_version, "v1.24.3");
        assert_eq!(obs.kube_proxy_version, "v1.24.2");
    }

    #[test]
    fn test_observe_missing_label() {
        let labels = BTreeMap::from([("kubernetes.io/os".to_string(), "linux".to_string())]);
        let obs = observe(&node(Some(labels), "v1.24.3", "v1.24.3"), DEFAULT_POOL_LABEL);
        assert!(obs.pool.is_none());
    }

    #[test]
    fn test_observe_custom_label() {
        let labels = BTreeMap::from([("pool".to_string(), "gpu".to_string())]);
        let obs = observe(&node(Some(labels), "v1.24.3", "v1.24.3"), "pool");
        assert_eq!(obs.pool.as_deref(), Some("gpu"));
    }

    #[test]
    fn test_observe_without_status() {
        let mut n = node(None, "", "");
        n.status = None;
        let obs = observe(&n, DEFAULT_POOL_LABEL);
        assert!(obs.kubelet_version.is_empty());
        assert!(obs.kube_proxy_version.is_empty());
    }
}
