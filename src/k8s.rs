//! kube-backed implementations of the cluster collaborators.

pub mod client;
pub mod cluster;
pub mod nodes;
pub mod probe;

pub use client::build_kube_client;
pub use cluster::KubeCluster;
pub use nodes::{DEFAULT_POOL_LABEL, KubeNodes};
pub use probe::{KubeWorkloads, fetch_apiserver_auth_token};
