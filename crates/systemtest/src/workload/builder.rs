use rand::Rng;

use super::security::{ClientRole, SecurityProfile, KEYSTORE_LOCATION, TRUSTSTORE_LOCATION};
use super::{RestartPolicy, SecretVolume, WorkloadRole, WorkloadSpec};
use crate::config::HarnessConfig;
use crate::naming::{cluster_ca_cert_secret_name, plain_bootstrap_address, tls_bootstrap_address};

const CLIENT_IMAGE: &str = "strimzi/test-client:latest";
const PING_IMAGE: &str = "strimzi/test-client:latest-kafka-2.0.0";

const CA_VOLUME: &str = "ca-cert";
const CA_MOUNT_PATH: &str = "/opt/kafka/cluster-ca";
const USER_VOLUME: &str = "tls-cert";
const USER_MOUNT_PATH: &str = "/opt/kafka/user-secret";

/// Rewrite a `strimzi/<image>:latest[-suffix]` reference to the configured
/// organisation and tag.
pub fn change_org_and_tag(image: &str, org: &str, tag: &str) -> String {
    let image = match image.strip_prefix("strimzi/") {
        Some(rest) => format!("{org}/{rest}"),
        None => image.to_string(),
    };
    match image.rsplit_once(':') {
        Some((repository, current)) if current == "latest" => format!("{repository}:{tag}"),
        Some((repository, current)) => match current.strip_prefix("latest-") {
            Some(suffix) => format!("{repository}:{tag}-{suffix}"),
            None => image.clone(),
        },
        None => image.clone(),
    }
}

/// Builds workload specs against one Kafka cluster.
#[derive(Debug, Clone)]
pub struct WorkloadBuilder {
    cluster_name: String,
    docker_org: String,
    docker_tag: String,
}

impl WorkloadBuilder {
    pub fn new(cluster_name: impl Into<String>, config: &HarnessConfig) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            docker_org: config.docker_org.clone(),
            docker_tag: config.docker_tag.clone(),
        }
    }

    fn bootstrap(&self, profile: &SecurityProfile) -> String {
        if profile.transport.is_encrypted() {
            tls_bootstrap_address(&self.cluster_name)
        } else {
            plain_bootstrap_address(&self.cluster_name)
        }
    }

    fn base_spec(
        &self,
        role: WorkloadRole,
        name: &str,
        topic: &str,
        messages: u32,
        profile: &SecurityProfile,
        (container_name, image, command): (&str, &str, &str),
    ) -> WorkloadSpec {
        WorkloadSpec {
            name: name.to_string(),
            role,
            topic: topic.to_string(),
            messages,
            bootstrap: self.bootstrap(profile),
            profile: profile.clone(),
            container_name: container_name.to_string(),
            image: change_org_and_tag(image, &self.docker_org, &self.docker_tag),
            command: command.to_string(),
            restart_policy: RestartPolicy::OnFailure,
            env: Vec::new(),
            volumes: Vec::new(),
            tls_client_identity: false,
        }
    }

    fn producer_opts(spec: &WorkloadSpec) -> String {
        format!(
            "--broker-list {} --topic {} --max-messages {}",
            spec.bootstrap, spec.topic, spec.messages
        )
    }

    fn consumer_opts(spec: &WorkloadSpec, group_id: &str) -> String {
        format!(
            "--broker-list {} --group-id {group_id} --verbose --topic {} --max-messages {}",
            spec.bootstrap, spec.topic, spec.messages
        )
    }

    /// Job sending `messages` records to `topic`.
    pub fn build_producer_spec(
        &self,
        name: &str,
        topic: &str,
        messages: u32,
        profile: &SecurityProfile,
    ) -> WorkloadSpec {
        let mut spec = self.base_spec(
            WorkloadRole::Producer,
            name,
            topic,
            messages,
            profile,
            ("send-records", CLIENT_IMAGE, "/opt/kafka/producer.sh"),
        );
        spec.set_env("PRODUCER_OPTS", Self::producer_opts(&spec));
        self.apply_profile(&mut spec);
        spec
    }

    /// Job reading `messages` records from `topic` in group `<name>-my-group`.
    pub fn build_consumer_spec(
        &self,
        name: &str,
        topic: &str,
        messages: u32,
        profile: &SecurityProfile,
    ) -> WorkloadSpec {
        let mut spec = self.base_spec(
            WorkloadRole::Consumer,
            name,
            topic,
            messages,
            profile,
            ("read-messages", CLIENT_IMAGE, "/opt/kafka/consumer.sh"),
        );
        spec.set_env("CONSUMER_OPTS", Self::consumer_opts(&spec, &format!("{name}-my-group")));
        self.apply_profile(&mut spec);
        spec
    }

    /// Ping job that produces and then consumes, with a random consumer group suffix.
    pub fn build_combined_spec(
        &self,
        name: &str,
        topic: &str,
        messages: u32,
        profile: &SecurityProfile,
    ) -> WorkloadSpec {
        let suffix = rand::thread_rng().gen_range(0..i32::MAX as u32);
        self.build_combined_spec_with_group_suffix(name, topic, messages, profile, suffix)
    }

    /// [`WorkloadBuilder::build_combined_spec`] with a fixed consumer group suffix.
    pub fn build_combined_spec_with_group_suffix(
        &self,
        name: &str,
        topic: &str,
        messages: u32,
        profile: &SecurityProfile,
        group_suffix: u32,
    ) -> WorkloadSpec {
        let mut spec = self.base_spec(
            WorkloadRole::Combined,
            name,
            topic,
            messages,
            profile,
            ("ping", PING_IMAGE, "/opt/kafka/ping.sh"),
        );
        spec.set_env("PRODUCER_OPTS", Self::producer_opts(&spec));
        spec.set_env(
            "CONSUMER_OPTS",
            Self::consumer_opts(&spec, &format!("{name}-{group_suffix}")),
        );
        self.apply_profile(&mut spec);
        spec
    }

    /// Attach configuration, credentials and trust material for every client
    /// role the workload carries.
    fn apply_profile(&self, spec: &mut WorkloadSpec) {
        let profile = spec.profile.clone();
        let roles = spec.role.client_roles();
        let tls_env = |role: ClientRole| format!("{}_TLS", role.env_prefix());

        if let Some(identity) = profile.identity.as_ref().filter(|i| i.tls_certificate) {
            for &role in roles {
                spec.set_env(&tls_env(role), "TRUE");
            }
            spec.attach_volume(SecretVolume {
                name: USER_VOLUME.to_string(),
                secret_name: identity.name.clone(),
                mount_path: USER_MOUNT_PATH.to_string(),
            });
            spec.set_env("USER_LOCATION", USER_MOUNT_PATH);
            spec.set_env("KEYSTORE_LOCATION", KEYSTORE_LOCATION);
            spec.tls_client_identity = true;
        }

        for &role in roles {
            spec.set_env(&format!("{}_CONFIGURATION", role.env_prefix()), profile.render(role));
        }

        if let Some(identity) = &profile.identity {
            spec.set_env("KAFKA_USER", identity.name.clone());
        }

        if profile.transport.is_encrypted() {
            spec.attach_volume(SecretVolume {
                name: CA_VOLUME.to_string(),
                secret_name: cluster_ca_cert_secret_name(&self.cluster_name),
                mount_path: CA_MOUNT_PATH.to_string(),
            });
            for &role in roles {
                spec.set_env(&tls_env(role), "TRUE");
            }
            spec.set_env("CA_LOCATION", CA_MOUNT_PATH);
            spec.set_env("TRUSTSTORE_LOCATION", TRUSTSTORE_LOCATION);
        }
    }
}
