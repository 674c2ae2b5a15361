//! Orchestration API boundary.
//!
//! Everything the harness observes or changes in the cluster goes through
//! [`ClusterApi`]. Production code uses [`KubeCluster`]; unit tests use mocks
//! or the in-memory fake.

mod kube_cluster;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Event, Pod, Secret};
use serde::Deserialize;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

pub use kube_cluster::KubeCluster;

use crate::tracker::TrackedResource;
use crate::Result;

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

/// Cluster operations consumed by the harness.
///
/// Lookups of a single object return `Ok(None)` when it does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_pods_with_labels(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Log of one container, or of the only container when `container` is `None`.
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
    ) -> Result<String>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job>;

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>>;

    async fn create_namespace(&self, name: &str) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    /// Delete a tracked resource. Deleting something already gone succeeds.
    async fn delete(&self, resource: &TrackedResource) -> Result<()>;

    /// Server-side apply every document in `manifest`. Namespaced objects
    /// without an explicit namespace land in `namespace`.
    async fn apply_manifest(&self, namespace: &str, manifest: &str) -> Result<()>;

    /// Run `command` in the first container of `pod`.
    async fn exec(&self, namespace: &str, pod: &str, command: Vec<String>) -> Result<ExecOutput>;
}

/// Shorthand for the `bash -c <script>` exec form used by every in-pod check.
pub fn bash(script: impl Into<String>) -> Vec<String> {
    vec!["/bin/bash".to_string(), "-c".to_string(), script.into()]
}

/// Every non-empty document of a multi-document YAML manifest.
///
/// Parsed eagerly: the YAML deserializer is not `Send` and must not live
/// across an await.
pub(crate) fn manifest_documents(manifest: &str) -> Result<Vec<Value>> {
    let documents = serde_yaml::Deserializer::from_str(manifest)
        .map(Value::deserialize)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents.into_iter().filter(|d| !d.is_null()).collect())
}
