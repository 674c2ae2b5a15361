//! In-memory cluster for stateful unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerStatus, Event, ObjectReference, Pod, PodSpec, PodStatus,
    Secret,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde_json::Value;

use super::{manifest_documents, ClusterApi, ExecOutput};
use crate::tracker::TrackedResource;
use crate::{Error, Result};

type Key = (String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    pods: BTreeMap<Key, Pod>,
    logs: HashMap<(String, String, String), String>,
    jobs: BTreeMap<Key, Job>,
    config_maps: BTreeMap<Key, ConfigMap>,
    secrets: BTreeMap<Key, Secret>,
    events: Vec<Event>,
    applied: Vec<Value>,
    deleted: Vec<TrackedResource>,
    exec_replies: HashMap<String, VecDeque<Result<ExecOutput, String>>>,
    failing_events: bool,
    /// Number of `namespace_exists` calls that still report a deleted
    /// namespace as present, emulating finalizers.
    namespace_linger: u32,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state().namespaces.insert(namespace.to_string());
        self
    }

    /// Add a running pod with the given containers, each logging `<pod>/<container> log`.
    pub fn add_pod(&self, namespace: &str, name: &str, containers: &[&str]) {
        self.add_labelled_pod(namespace, name, containers, &[]);
    }

    pub fn add_labelled_pod(
        &self,
        namespace: &str,
        name: &str,
        containers: &[&str],
        labels: &[(&str, &str)],
    ) {
        let mut metadata = meta(namespace, name);
        if !labels.is_empty() {
            metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
        }
        let pod = Pod {
            metadata,
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|c| Container {
                        name: (*c).to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(
                    containers
                        .iter()
                        .map(|c| ContainerStatus {
                            name: (*c).to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
        };
        let mut state = self.state();
        state.namespaces.insert(namespace.to_string());
        for container in containers {
            state.logs.insert(
                (namespace.to_string(), name.to_string(), (*container).to_string()),
                format!("{name}/{container} log\n"),
            );
        }
        state.pods.insert(key(namespace, name), pod);
    }

    pub fn add_config_map(&self, namespace: &str, name: &str) {
        let config_map = ConfigMap {
            metadata: meta(namespace, name),
            data: Some(BTreeMap::from([("key".to_string(), "value".to_string())])),
            ..Default::default()
        };
        self.state().config_maps.insert(key(namespace, name), config_map);
    }

    pub fn add_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: meta(namespace, name),
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.state().secrets.insert(key(namespace, name), secret);
    }

    pub fn add_event(&self, namespace: &str, kind: &str, object: &str, reason: &str) {
        let event = Event {
            metadata: meta(namespace, &format!("{object}.{reason}")),
            involved_object: ObjectReference {
                kind: Some(kind.to_string()),
                name: Some(object.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            reason: Some(reason.to_string()),
            message: Some(format!("{kind} {object} {reason}")),
            type_: Some("Normal".to_string()),
            ..Default::default()
        };
        self.state().events.push(event);
    }

    pub fn set_job_status(&self, namespace: &str, name: &str, status: Option<JobStatus>) {
        let mut state = self.state();
        let job = state
            .jobs
            .entry(key(namespace, name))
            .or_insert_with(|| Job {
                metadata: meta(namespace, name),
                ..Default::default()
            });
        job.status = status;
    }

    pub fn fail_event_listing(&self) {
        self.state().failing_events = true;
    }

    pub fn linger_namespaces(&self, polls: u32) {
        self.state().namespace_linger = polls;
    }

    /// Queue replies for successive `exec` calls against `pod`.
    pub fn queue_exec(&self, pod: &str, reply: Result<ExecOutput, String>) {
        self.state()
            .exec_replies
            .entry(pod.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn pod_names(&self, namespace: &str) -> Vec<String> {
        self.state()
            .pods
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state().namespaces.contains(namespace)
    }

    pub fn applied(&self) -> Vec<Value> {
        self.state().applied.clone()
    }

    pub fn deleted(&self) -> Vec<TrackedResource> {
        self.state().deleted.clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state().jobs.values().cloned().collect()
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
        None => false,
    })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        Ok(self
            .state()
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn list_pods_with_labels(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        Ok(self
            .list_pods(namespace)
            .await?
            .into_iter()
            .filter(|pod| matches_selector(pod, selector))
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.state().pods.get(&key(namespace, name)).cloned())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
    ) -> Result<String> {
        let state = self.state();
        let container = match container {
            Some(c) => c,
            None => state
                .pods
                .get(&key(namespace, pod))
                .and_then(|p| p.spec.as_ref())
                .and_then(|s| s.containers.first())
                .map(|c| c.name.clone())
                .ok_or_else(|| Error::not_found("Pod", pod))?,
        };
        state
            .logs
            .get(&(namespace.to_string(), pod.to_string(), container.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found("Container", format!("{pod}/{container}")))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        Ok(self.state().jobs.get(&key(namespace, name)).cloned())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job> {
        let name = job.metadata.name.clone().unwrap_or_default();
        let mut created = job.clone();
        created.metadata.namespace = Some(namespace.to_string());
        self.state()
            .jobs
            .insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>> {
        Ok(self
            .state()
            .config_maps
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, cm)| cm.clone())
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.state().secrets.get(&key(namespace, name)).cloned())
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>> {
        let state = self.state();
        if state.failing_events {
            return Err(Error::Exec("events API unavailable".to_string()));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| e.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.state().namespaces.insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if !state.namespaces.remove(name) {
            return Err(Error::not_found("Namespace", name));
        }
        state.pods.retain(|(ns, _), _| ns != name);
        state.jobs.retain(|(ns, _), _| ns != name);
        state.config_maps.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state();
        if state.namespace_linger > 0 {
            state.namespace_linger -= 1;
            return Ok(true);
        }
        Ok(state.namespaces.contains(name))
    }

    async fn delete(&self, resource: &TrackedResource) -> Result<()> {
        let mut state = self.state();
        if let Some(ns) = &resource.namespace {
            let k = key(ns, &resource.name);
            match resource.kind.as_str() {
                "Job" => {
                    state.jobs.remove(&k);
                }
                "Pod" => {
                    state.pods.remove(&k);
                }
                "ConfigMap" => {
                    state.config_maps.remove(&k);
                }
                _ => {}
            }
        }
        state.deleted.push(resource.clone());
        Ok(())
    }

    async fn apply_manifest(&self, namespace: &str, manifest: &str) -> Result<()> {
        for obj in manifest_documents(manifest)? {
            let resource = TrackedResource::from_manifest(&obj, namespace)?;
            if resource.kind == "Deployment" {
                // The operator deployment brings up its own pod.
                let ns = resource.namespace.clone().unwrap_or_default();
                self.add_pod(&ns, &format!("{}-6d4f9", resource.name), &["operator"]);
            }
            self.state().applied.push(obj);
        }
        Ok(())
    }

    async fn exec(&self, _namespace: &str, pod: &str, _command: Vec<String>) -> Result<ExecOutput> {
        let reply = self
            .state()
            .exec_replies
            .get_mut(pod)
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
        match reply {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(Error::Exec(message)),
            None => Err(Error::not_found("Pod", pod)),
        }
    }
}
