//! Resource names derived from a Kafka cluster name.

/// Plain listener port on the bootstrap service.
pub const PLAIN_BOOTSTRAP_PORT: u16 = 9092;

/// TLS listener port on the bootstrap service.
pub const TLS_BOOTSTRAP_PORT: u16 = 9093;

/// Base client port of the ZooKeeper ensemble; member `i` listens on `base * 10 + i`.
pub const ENSEMBLE_CLIENT_PORT_BASE: u32 = 2181;

pub fn kafka_cluster_name(cluster: &str) -> String {
    format!("{cluster}-kafka")
}

pub fn kafka_pod_name(cluster: &str, index: u32) -> String {
    format!("{}-{index}", kafka_cluster_name(cluster))
}

pub fn zookeeper_cluster_name(cluster: &str) -> String {
    format!("{cluster}-zookeeper")
}

pub fn zookeeper_pod_name(cluster: &str, index: u32) -> String {
    format!("{}-{index}", zookeeper_cluster_name(cluster))
}

/// Local client port of ensemble member `index`, reachable only from inside its pod.
pub fn zookeeper_member_port(index: u32) -> u32 {
    ENSEMBLE_CLIENT_PORT_BASE * 10 + index
}

pub fn bootstrap_service_name(cluster: &str) -> String {
    format!("{cluster}-kafka-bootstrap")
}

pub fn plain_bootstrap_address(cluster: &str) -> String {
    format!("{}:{PLAIN_BOOTSTRAP_PORT}", bootstrap_service_name(cluster))
}

pub fn tls_bootstrap_address(cluster: &str) -> String {
    format!("{}:{TLS_BOOTSTRAP_PORT}", bootstrap_service_name(cluster))
}

pub fn cluster_ca_cert_secret_name(cluster: &str) -> String {
    format!("{cluster}-cluster-ca-cert")
}

pub fn entity_operator_name(cluster: &str) -> String {
    format!("{cluster}-entity-operator")
}

/// Label selector matching the entity operator pod (hosts the user operator).
pub fn entity_operator_selector(cluster: &str) -> String {
    format!("strimzi.io/name={}", entity_operator_name(cluster))
}
