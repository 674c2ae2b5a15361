//! [`ClusterApi`] backed by a live `kube::Client`.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Event, Namespace, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, AttachParams, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams,
    Patch, PatchParams, PostParams, PropagationPolicy,
};
use kube::discovery::ApiResource;
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::{manifest_documents, ClusterApi, ExecOutput};
use crate::tracker::{is_cluster_scoped, TrackedResource};
use crate::{Error, Result};

const FIELD_MANAGER: &str = "systemtest";

/// Cluster access through the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn dynamic_api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut out = String::new();
    if let Some(mut reader) = reader {
        reader.read_to_string(&mut out).await?;
    }
    Ok(out)
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.list(&ListParams::default()).await?.items)
    }

    async fn list_pods_with_labels(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.list(&ListParams::default().labels(selector)).await?.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.get_opt(name).await?)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
    ) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container,
            ..Default::default()
        };
        Ok(pods.logs(pod, &params).await?)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(jobs.get_opt(name).await?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(jobs.create(&PostParams::default(), job).await?)
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(config_maps.list(&ListParams::default()).await?.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(secrets.get_opt(name).await?)
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        Ok(events.list(&ListParams::default()).await?.items)
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces.create(&PostParams::default(), &namespace).await?;
        debug!(namespace = name, "Created namespace");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces.delete(name, &DeleteParams::default()).await?;
        debug!(namespace = name, "Requested namespace deletion");
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(name).await?.is_some())
    }

    async fn delete(&self, resource: &TrackedResource) -> Result<()> {
        let gvk = parse_gvk(&resource.api_version, &resource.kind);
        let api = self.dynamic_api(&gvk, resource.namespace.as_deref());
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match api.delete(&resource.name, &params).await.map_err(Error::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                trace!(resource = %resource, "Already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_manifest(&self, namespace: &str, manifest: &str) -> Result<()> {
        for obj in manifest_documents(manifest)? {
            let resource = TrackedResource::from_manifest(&obj, namespace)?;
            let gvk = parse_gvk(&resource.api_version, &resource.kind);
            let target_ns = if is_cluster_scoped(&resource.kind) {
                None
            } else {
                resource.namespace.as_deref()
            };
            let api = self.dynamic_api(&gvk, target_ns);
            let params = PatchParams::apply(FIELD_MANAGER).force();
            api.patch(&resource.name, &params, &Patch::Apply(&obj))
                .await?;
            debug!(resource = %resource, "Applied manifest");
        }
        Ok(())
    }

    async fn exec(&self, namespace: &str, pod: &str, command: Vec<String>) -> Result<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default().stdout(true).stderr(true);
        let mut attached = pods.exec(pod, command, &params).await?;

        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let status = attached.take_status();

        let (stdout, stderr) = tokio::join!(read_stream(stdout_reader), read_stream(stderr_reader));
        let stdout = stdout.map_err(|e| Error::Exec(format!("reading stdout of {pod}: {e}")))?;
        let stderr = stderr.map_err(|e| Error::Exec(format!("reading stderr of {pod}: {e}")))?;

        let success = match status {
            Some(status) => status
                .await
                .is_some_and(|s| s.status.as_deref() == Some("Success")),
            None => false,
        };

        Ok(ExecOutput {
            stdout,
            stderr,
            success,
        })
    }
}
