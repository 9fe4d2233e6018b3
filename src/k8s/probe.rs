//! Probe workload as a `batch/v1` Job running next to the API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, PodTemplateSpec};
use kube::Api;
use kube::api::{DeleteParams, ListParams, ObjectMeta, PostParams};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::validator::{PodStatus, ProbeJob, ProbeSpec, WorkloadApi};

/// Deployment whose readiness probe carries the API server auth header.
const APISERVER_DEPLOYMENT: &str = "kube-apiserver";

/// Polls the health endpoint once per second; exits non-zero on the first
/// answer other than 200 so the Job records a failure.
const PROBE_SCRIPT: &str = r#"while true; do
  code=$(curl -sk -o /dev/null -w '%{http_code}' -H "Authorization: ${TOKEN}" https://kube-apiserver/healthz)
  if [ "$code" != "200" ]; then
    echo "$(date -u +%FT%TZ) healthz returned ${code}"
    exit 1
  fi
  sleep 1
done"#;

/// Workload API on the hosting (seed) cluster.
pub struct KubeWorkloads {
    client: kube::Client,
}

impl KubeWorkloads {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Normalize a token to an `Authorization` header value.
fn authorization_header(token: &SecretString) -> String {
    let value = token.expose_secret();
    if value.starts_with("Bearer ") {
        value.to_string()
    } else {
        format!("Bearer {value}")
    }
}

/// Build the probe Job for `spec`.
pub fn probe_job(spec: &ProbeSpec) -> Job {
    let labels = BTreeMap::from([
        ("app".to_string(), "zero-downtime-validator".to_string()),
        ("test".to_string(), spec.label.clone()),
    ]);

    Job {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "validator".to_string(),
                        image: Some(spec.image.clone()),
                        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                        args: Some(vec![PROBE_SCRIPT.to_string()]),
                        env: Some(vec![EnvVar {
                            name: "TOKEN".to_string(),
                            value: Some(authorization_header(&spec.auth_token)),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Read the API server auth header from the `kube-apiserver` deployment's
/// readiness probe in the cluster's control plane namespace.
pub async fn fetch_apiserver_auth_token(
    client: &kube::Client,
    namespace: &str,
) -> Result<SecretString> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = api.get(APISERVER_DEPLOYMENT).await.map_err(|e| {
        UpgradeError::kube(&format!("deployment {namespace}/{APISERVER_DEPLOYMENT}"), e)
    })?;

    auth_header_from_deployment(&deployment)
        .map(SecretString::from)
        .ok_or_else(|| UpgradeError::MissingAuthToken(namespace.to_string()))
}

fn auth_header_from_deployment(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .readiness_probe
        .as_ref()?
        .http_get
        .as_ref()?
        .http_headers
        .as_ref()?
        .first()
        .map(|h| h.value.clone())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl WorkloadApi for KubeWorkloads {
    async fn create_probe_workload(&self, spec: &ProbeSpec) -> Result<ProbeJob> {
        let job = probe_job(spec);
        self.jobs(&spec.namespace)
            .create(&PostParams::default(), &job)
            .await
            .map_err(|e| {
                UpgradeError::kube(&format!("create job {}/{}", spec.namespace, spec.name), e)
            })?;

        debug!("Created probe job {}/{}", spec.namespace, spec.name);
        Ok(ProbeJob::created(spec.name.clone(), spec.namespace.clone()))
    }

    async fn pods_for_workload(&self, job: &ProbeJob) -> Result<Vec<PodStatus>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &job.namespace);
        let list = pods
            .list(&ListParams::default().labels(&format!("job-name={}", job.name)))
            .await
            .map_err(|e| UpgradeError::kube(&format!("list pods of job {}", job.name), e))?;

        Ok(list
            .items
            .iter()
            .map(|pod| PodStatus {
                name: pod.metadata.name.clone().unwrap_or_default(),
                ready: pod_ready(pod),
            })
            .collect())
    }

    async fn failure_count(&self, job: &ProbeJob) -> Result<i32> {
        let current = self
            .jobs(&job.namespace)
            .get(&job.name)
            .await
            .map_err(|e| UpgradeError::kube(&format!("job {}/{}", job.namespace, job.name), e))?;

        Ok(current
            .status
            .and_then(|s| s.failed)
            .unwrap_or_default())
    }

    async fn delete_workload(&self, job: &ProbeJob) -> Result<()> {
        self.jobs(&job.namespace)
            .delete(&job.name, &DeleteParams::foreground())
            .await
            .map_err(|e| UpgradeError::kube(&format!("job {}/{}", job.namespace, job.name), e))?;
        Ok(())
    }
}
