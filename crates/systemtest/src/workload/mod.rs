//! Ephemeral producer, consumer and ping workloads.

mod builder;
mod security;

use k8s_openapi::api::batch::v1::Job;
use serde_json::json;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::tracker::{ResourceTracker, TrackedResource};
use crate::{Error, Result};

pub use builder::{change_org_and_tag, WorkloadBuilder};
pub use security::{
    ClientIdentity, ClientRole, ScramCredentials, SecurityProfile, SecurityProtocol, Transport,
    KEYSTORE_LOCATION, TRUSTSTORE_LOCATION,
};

/// What a workload runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadRole {
    Producer,
    Consumer,
    /// Produces and then consumes within one pod.
    Combined,
}

impl WorkloadRole {
    /// Client configurations carried by this workload.
    pub fn client_roles(self) -> &'static [ClientRole] {
        match self {
            Self::Producer => &[ClientRole::Producer],
            Self::Consumer => &[ClientRole::Consumer],
            Self::Combined => &[ClientRole::Producer, ClientRole::Consumer],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub name: String,
    pub value: String,
}

/// A secret mounted into the workload container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVolume {
    pub name: String,
    pub secret_name: String,
    pub mount_path: String,
}

/// Pods are restarted only when they fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    OnFailure,
    Never,
}

impl RestartPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnFailure => "OnFailure",
            Self::Never => "Never",
        }
    }
}

/// A single-container run-to-completion job, before submission.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub name: String,
    pub role: WorkloadRole,
    pub topic: String,
    pub messages: u32,
    pub bootstrap: String,
    pub profile: SecurityProfile,
    pub container_name: String,
    pub image: String,
    pub command: String,
    pub restart_policy: RestartPolicy,
    pub env: Vec<EnvBinding>,
    pub volumes: Vec<SecretVolume>,
    /// Set when the container must build a keystore from a user certificate.
    pub tls_client_identity: bool,
}

impl WorkloadSpec {
    /// Bind `name`, replacing any earlier value in place.
    pub fn set_env(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.env.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.value = value,
            None => self.env.push(EnvBinding {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Attach a secret volume unless one with the same name is already attached.
    pub fn attach_volume(&mut self, volume: SecretVolume) {
        if self.volumes.iter().all(|v| v.name != volume.name) {
            self.volumes.push(volume);
        }
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn volume(&self, name: &str) -> Option<&SecretVolume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Render as a `batch/v1` Job whose pod carries the `job=<name>` label.
    pub fn to_job(&self) -> Result<Job> {
        let labels = json!({ "job": self.name });
        let env: Vec<_> = self
            .env
            .iter()
            .map(|e| json!({ "name": e.name, "value": e.value }))
            .collect();
        let volume_mounts: Vec<_> = self
            .volumes
            .iter()
            .map(|v| json!({ "name": v.name, "mountPath": v.mount_path }))
            .collect();
        let volumes: Vec<_> = self
            .volumes
            .iter()
            .map(|v| json!({ "name": v.name, "secret": { "secretName": v.secret_name } }))
            .collect();

        let job = json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": self.name,
                "labels": labels
            },
            "spec": {
                "template": {
                    "metadata": {
                        "name": self.name,
                        "labels": labels
                    },
                    "spec": {
                        "restartPolicy": self.restart_policy.as_str(),
                        "containers": [{
                            "name": self.container_name,
                            "image": self.image,
                            "command": [self.command],
                            "env": env,
                            "volumeMounts": volume_mounts
                        }],
                        "volumes": volumes
                    }
                }
            }
        });
        Ok(serde_json::from_value(job)?)
    }
}

/// Read SCRAM credentials of `user` from the secret the user operator created.
pub async fn scram_identity(
    cluster: &dyn ClusterApi,
    namespace: &str,
    user: &str,
) -> Result<ClientIdentity> {
    let secret = cluster
        .get_secret(namespace, user)
        .await?
        .ok_or_else(|| Error::Configuration(format!("The Secret {user} does not exist")))?;
    Ok(ClientIdentity::scram(ScramCredentials::from_secret(user, &secret)?))
}

/// Create the workload's Job and hand it to `tracker` for teardown.
pub async fn submit(
    cluster: &dyn ClusterApi,
    tracker: &mut ResourceTracker,
    namespace: &str,
    spec: &WorkloadSpec,
) -> Result<Job> {
    let job = cluster.create_job(namespace, &spec.to_job()?).await?;
    tracker.track(TrackedResource::job(namespace, &spec.name));
    info!(job = %spec.name, namespace, role = ?spec.role, "Created Job");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::config::HarnessConfig;

    fn tls_user_spec() -> WorkloadSpec {
        let profile = SecurityProfile::new(Transport::Tls, Some(ClientIdentity::tls("my-user")));
        WorkloadBuilder::new("my-cluster", &HarnessConfig::default())
            .build_producer_spec("hello-world-producer", "my-topic", 100, &profile)
    }

    #[test]
    fn test_job_rendering() {
        let job = tls_user_spec().to_job().unwrap();
        let template = job.spec.unwrap().template;
        assert_eq!(
            template.metadata.unwrap().labels.unwrap().get("job").map(String::as_str),
            Some("hello-world-producer")
        );

        let pod = template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
        let container = &pod.containers[0];
        assert_eq!(container.name, "send-records");
        assert_eq!(container.command.as_deref(), Some(&["/opt/kafka/producer.sh".to_string()][..]));

        let mut volumes: Vec<_> = pod
            .volumes
            .unwrap()
            .into_iter()
            .map(|v| (v.name, v.secret.unwrap().secret_name.unwrap()))
            .collect();
        volumes.sort();
        assert_eq!(
            volumes,
            vec![
                ("ca-cert".to_string(), "my-cluster-cluster-ca-cert".to_string()),
                ("tls-cert".to_string(), "my-user".to_string()),
            ]
        );
    }

    #[test]
    fn test_never_restart_policy_reaches_pod() {
        let mut spec = tls_user_spec();
        spec.restart_policy = RestartPolicy::Never;
        let pod = spec.to_job().unwrap().spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn test_set_env_replaces_in_place() {
        let mut spec = tls_user_spec();
        let before = spec.env.len();
        spec.set_env("PRODUCER_TLS", "TRUE");
        assert_eq!(spec.env.len(), before);
        assert_eq!(spec.env.iter().filter(|e| e.name == "PRODUCER_TLS").count(), 1);
    }

    #[tokio::test]
    async fn test_submit_tracks_created_job() {
        let cluster = FakeCluster::new();
        let mut tracker = ResourceTracker::new();
        let spec = tls_user_spec();

        submit(&cluster, &mut tracker, "ns", &spec).await.unwrap();

        assert_eq!(cluster.jobs().len(), 1);
        let tracked: Vec<_> = tracker.iter().cloned().collect();
        assert_eq!(tracked, vec![TrackedResource::job("ns", "hello-world-producer")]);
    }

    #[tokio::test]
    async fn test_scram_identity_requires_password() {
        let cluster = FakeCluster::new();
        cluster.add_secret("ns", "alice", &[("password", "s3cret")]);
        cluster.add_secret("ns", "broken", &[("user.crt", "---")]);

        let identity = scram_identity(&cluster, "ns", "alice").await.unwrap();
        assert_eq!(identity.scram.unwrap().password, "s3cret");
        assert!(matches!(
            scram_identity(&cluster, "ns", "broken").await,
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            scram_identity(&cluster, "ns", "missing").await,
            Err(Error::Configuration(_))
        ));
    }
}
