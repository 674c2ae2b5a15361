//! Post-teardown verification and baseline re-provisioning.
//!
//! After every scoped teardown the operator namespace must hold nothing but
//! operator pods. When anything else is left behind, the namespace is rebuilt
//! from the baseline installation manifests so the next scenario starts clean,
//! and the scenario that left the mess is still failed.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::cluster::ClusterApi;
use crate::config::CLUSTER_OPERATOR_PREFIX;
use crate::environment::ClusterEnvironment;
use crate::poll::wait_for_namespace_deletion;
use crate::tracker::TrackedResource;
use crate::{Error, Result};

/// Manifests re-created by explicit steps rather than the bulk apply.
const EXPLICIT_MANIFESTS: &str = ".*(Binding|Deployment)-.*";

const ROLE_BINDINGS: &[&str] = &[
    "020-RoleBinding-strimzi-cluster-operator.yaml",
    "021-ClusterRoleBinding-strimzi-cluster-operator.yaml",
    "030-ClusterRoleBinding-strimzi-cluster-operator-kafka-broker-delegation.yaml",
    "031-RoleBinding-strimzi-cluster-operator-entity-operator-delegation.yaml",
    "032-RoleBinding-strimzi-cluster-operator-topic-operator-delegation.yaml",
];

const OPERATOR_DEPLOYMENT: &str = "050-Deployment-strimzi-cluster-operator.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Stable,
    Verifying,
    Recovering,
}

/// The operator's installation files on disk.
#[derive(Debug, Clone)]
pub struct BaselineInstall {
    dir: PathBuf,
}

impl BaselineInstall {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Files for the bulk apply, sorted by name, bindings and deployments excluded.
    pub async fn manifests(&self) -> Result<Vec<PathBuf>> {
        let explicit = Regex::new(EXPLICIT_MANIFESTS).map_err(|e| Error::Configuration(e.to_string()))?;
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_file() && !explicit.is_match(&name) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn load(&self, file: &str) -> Result<Value> {
        let path = self.dir.join(file);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// The five operator bindings granting access to `target_namespace`,
    /// bound to the service account in `operator_namespace`.
    pub async fn role_bindings(&self, operator_namespace: &str, target_namespace: &str) -> Result<Vec<Value>> {
        let mut bindings = Vec::with_capacity(ROLE_BINDINGS.len());
        for file in ROLE_BINDINGS {
            let mut binding = self.load(file).await?;
            retarget_binding(&mut binding, operator_namespace, target_namespace);
            bindings.push(binding);
        }
        Ok(bindings)
    }

    /// The operator deployment in `operator_namespace`, watching `watched_namespaces`.
    pub async fn operator_deployment(&self, operator_namespace: &str, watched_namespaces: &str) -> Result<Value> {
        let mut deployment = self.load(OPERATOR_DEPLOYMENT).await?;
        deployment["metadata"]["namespace"] = Value::from(operator_namespace);
        let containers = deployment
            .pointer_mut("/spec/template/spec/containers")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::Configuration(format!("{OPERATOR_DEPLOYMENT} has no containers")))?;
        for container in containers {
            set_container_env(container, "STRIMZI_NAMESPACE", watched_namespaces);
        }
        Ok(deployment)
    }
}

fn retarget_binding(binding: &mut Value, operator_namespace: &str, target_namespace: &str) {
    let cluster_scoped = binding["kind"].as_str() == Some("ClusterRoleBinding");
    if cluster_scoped {
        let name = binding["metadata"]["name"].as_str().unwrap_or_default().to_string();
        binding["metadata"]["name"] = Value::from(format!("{name}-{target_namespace}"));
        if let Some(metadata) = binding["metadata"].as_object_mut() {
            metadata.remove("namespace");
        }
    } else {
        binding["metadata"]["namespace"] = Value::from(target_namespace);
    }
    if let Some(subjects) = binding["subjects"].as_array_mut() {
        for subject in subjects {
            subject["namespace"] = Value::from(operator_namespace);
        }
    }
}

fn set_container_env(container: &mut Value, name: &str, value: &str) {
    let binding = serde_json::json!({ "name": name, "value": value });
    if !container["env"].is_array() {
        container["env"] = Value::Array(Vec::new());
    }
    if let Some(env) = container["env"].as_array_mut() {
        match env.iter_mut().find(|e| e["name"] == name) {
            Some(existing) => *existing = binding,
            None => env.push(binding),
        }
    }
}

async fn apply_tracked(
    cluster: &dyn ClusterApi,
    env: &mut ClusterEnvironment,
    namespace: &str,
    manifest: &Value,
) -> Result<()> {
    cluster
        .apply_manifest(namespace, &serde_yaml::to_string(manifest)?)
        .await?;
    env.class_resources()
        .track(TrackedResource::from_manifest(manifest, namespace)?);
    Ok(())
}

/// Apply the operator bindings for each of `target_namespaces`.
pub async fn apply_role_bindings(
    cluster: &dyn ClusterApi,
    env: &mut ClusterEnvironment,
    install: &BaselineInstall,
    operator_namespace: &str,
    target_namespaces: &[String],
) -> Result<()> {
    for target in target_namespaces {
        for binding in install.role_bindings(operator_namespace, target).await? {
            apply_tracked(cluster, env, target, &binding).await?;
        }
    }
    Ok(())
}

/// Deploy the cluster operator into `operator_namespace`.
pub async fn deploy_cluster_operator(
    cluster: &dyn ClusterApi,
    env: &mut ClusterEnvironment,
    install: &BaselineInstall,
    operator_namespace: &str,
    watched_namespaces: &str,
) -> Result<()> {
    let deployment = install.operator_deployment(operator_namespace, watched_namespaces).await?;
    apply_tracked(cluster, env, operator_namespace, &deployment).await
}

/// Drives the Stable → Verifying → (Stable | Recovering) cycle.
#[derive(Debug)]
pub struct EnvironmentRecovery {
    install: BaselineInstall,
    state: RecoveryState,
    transitions: Vec<RecoveryState>,
}

impl EnvironmentRecovery {
    pub fn new(install: BaselineInstall) -> Self {
        Self {
            install,
            state: RecoveryState::Stable,
            transitions: vec![RecoveryState::Stable],
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn transitions(&self) -> &[RecoveryState] {
        &self.transitions
    }

    fn enter(&mut self, state: RecoveryState) {
        debug!(from = ?self.state, to = ?state, "Recovery state change");
        self.state = state;
        self.transitions.push(state);
    }

    /// Verify `namespace` holds only operator pods after teardown.
    ///
    /// If anything else is left, rebuild the namespace with bindings for each
    /// of `aux_namespaces` (just `namespace` when empty) and return
    /// [`Error::EnvironmentInconsistent`]. Failures while rebuilding are
    /// returned as is.
    pub async fn verify_and_recover(
        &mut self,
        cluster: &dyn ClusterApi,
        env: &mut ClusterEnvironment,
        namespace: &str,
        aux_namespaces: &[String],
    ) -> Result<()> {
        self.enter(RecoveryState::Verifying);
        let wait = env.config().teardown_wait;
        info!(?wait, "Waiting after cleanup to make sure everything is deleted");
        tokio::time::sleep(wait).await;

        let leftovers: Vec<String> = cluster
            .list_pods(namespace)
            .await?
            .iter()
            .filter_map(|pod| {
                let name = pod.metadata.name.as_deref()?;
                if name.starts_with(CLUSTER_OPERATOR_PREFIX) {
                    return None;
                }
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or("Unknown");
                Some(format!("{name} - {phase}"))
            })
            .collect();

        if leftovers.is_empty() {
            self.enter(RecoveryState::Stable);
            return Ok(());
        }

        self.enter(RecoveryState::Recovering);
        let aux_namespaces = if aux_namespaces.is_empty() {
            vec![namespace.to_string()]
        } else {
            aux_namespaces.to_vec()
        };
        self.recreate(cluster, env, namespace, &aux_namespaces).await?;
        self.enter(RecoveryState::Stable);

        Err(Error::EnvironmentInconsistent {
            namespace: namespace.to_string(),
            leftovers,
        })
    }

    async fn recreate(
        &self,
        cluster: &dyn ClusterApi,
        env: &mut ClusterEnvironment,
        namespace: &str,
        aux_namespaces: &[String],
    ) -> Result<()> {
        info!(namespace, "There are some unexpected pods! Cleanup is not finished properly! Wait till env will be recreated.");
        env.class_resources().delete_all(cluster).await?;

        let fallback = env.config().default_namespace.clone();
        env.switch_namespace(fallback);
        cluster.delete_namespace(namespace).await?;
        wait_for_namespace_deletion(cluster, namespace).await?;
        cluster.create_namespace(namespace).await?;
        env.switch_namespace(namespace);

        for file in self.install.manifests().await? {
            info!(file = %file.display(), "Creating possibly modified version of baseline manifest");
            apply_file(cluster, namespace, &file).await?;
        }

        env.reset_class_resources();
        apply_role_bindings(cluster, env, &self.install, namespace, aux_namespaces).await?;
        deploy_cluster_operator(cluster, env, &self.install, namespace, namespace).await?;
        info!(namespace, "Env recreated.");
        Ok(())
    }
}

async fn apply_file(cluster: &dyn ClusterApi, namespace: &str, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file).await?;
    cluster.apply_manifest(namespace, &content).await
}
