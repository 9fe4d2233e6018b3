//! Kubernetes client builder.

use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

/// Build a client from an explicit kubeconfig file, or from the default
/// inference chain (`KUBECONFIG`, `~/.kube/config`, in-cluster) when `None`.
pub async fn build_kube_client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            debug!("Loading kubeconfig from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes client configuration")?,
    };

    debug!("Kubernetes API endpoint: {}", config.cluster_url);

    kube::Client::try_from(config).context("Failed to build Kubernetes client")
}
