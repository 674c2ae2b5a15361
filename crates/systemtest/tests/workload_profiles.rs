//! Workload specs across security profiles.

use systemtest::workload::{ClientIdentity, ScramCredentials, Transport, WorkloadSpec};
use systemtest::{HarnessConfig, SecurityProfile, WorkloadBuilder};

fn builder() -> WorkloadBuilder {
    WorkloadBuilder::new("my-cluster", &HarnessConfig::default())
}

fn without_security_lines(config: &str) -> Vec<&str> {
    config
        .lines()
        .filter(|l| !l.starts_with("security.protocol=") && !l.starts_with("ssl."))
        .collect()
}

fn without_sasl_lines(config: &str) -> Vec<&str> {
    config
        .lines()
        .filter(|l| {
            !l.starts_with("security.protocol=")
                && !l.starts_with("sasl.")
                && !l.starts_with("username=")
                && !l.starts_with("password=")
        })
        .collect()
}

fn alice() -> ClientIdentity {
    ClientIdentity::scram(ScramCredentials {
        username: "alice".to_string(),
        password: "s3cret".to_string(),
    })
}

fn tls_volumes(spec: &WorkloadSpec) -> Vec<&str> {
    spec.volumes
        .iter()
        .filter(|v| v.name == "tls-cert")
        .map(|v| v.secret_name.as_str())
        .collect()
}

#[test]
fn encryption_only_adds_trust_material() {
    let plain = builder().build_producer_spec("hello", "topic", 10, &SecurityProfile::plain());
    let tls = builder().build_producer_spec(
        "hello",
        "topic",
        10,
        &SecurityProfile::new(Transport::Tls, None),
    );

    let plain_config = plain.env_value("PRODUCER_CONFIGURATION").unwrap();
    let tls_config = tls.env_value("PRODUCER_CONFIGURATION").unwrap();

    assert!(plain_config.contains("security.protocol=PLAINTEXT"));
    assert!(tls_config.contains("security.protocol=SSL"));
    assert_eq!(without_security_lines(plain_config), without_security_lines(tls_config));
    assert!(tls.volume("ca-cert").is_some());
    assert!(plain.volume("ca-cert").is_none());
}

#[test]
fn tls_client_gets_exactly_one_certificate_volume() {
    let profile = SecurityProfile::new(Transport::Tls, Some(ClientIdentity::tls("bob")));
    let spec = builder().build_combined_spec("ping", "topic", 10, &profile);

    assert_eq!(tls_volumes(&spec), vec!["bob"]);
    assert!(spec.tls_client_identity);
    assert_eq!(spec.env_value("KAFKA_USER"), Some("bob"));
    assert_eq!(spec.env_value("PRODUCER_TLS"), Some("TRUE"));
    assert_eq!(spec.env_value("CONSUMER_TLS"), Some("TRUE"));

    let job = spec.to_job().unwrap();
    let pod = job.spec.unwrap().template.spec.unwrap();
    let volumes = pod.volumes.unwrap();
    assert_eq!(volumes.iter().filter(|v| v.name == "tls-cert").count(), 1);
}

#[test]
fn scram_client_has_no_certificate_volume() {
    let profile = SecurityProfile::new(Transport::Tls, Some(alice()));
    let spec = builder().build_consumer_spec("hello", "topic", 10, &profile);

    assert!(tls_volumes(&spec).is_empty());
    assert!(!spec.tls_client_identity);
    let config = spec.env_value("CONSUMER_CONFIGURATION").unwrap();
    assert!(config.contains("security.protocol=SASL_SSL"));
    assert!(!config.contains("ssl.keystore"));
}

#[test]
fn combined_workload_configures_roles_independently() {
    let profile = SecurityProfile::new(Transport::Plain, Some(ClientIdentity::anonymous("carol")));
    let spec = builder().build_combined_spec_with_group_suffix("ping", "topic", 10, &profile, 42);

    let producer = spec.env_value("PRODUCER_CONFIGURATION").unwrap();
    let consumer = spec.env_value("CONSUMER_CONFIGURATION").unwrap();

    assert!(producer.starts_with("acks=all\n"));
    assert!(consumer.starts_with("auto.offset.reset=earliest\n"));
    assert!(!producer.contains("auto.offset.reset"));
    assert!(!consumer.contains("acks="));
    assert!(spec.env_value("CONSUMER_OPTS").unwrap().contains("--group-id ping-42"));
    assert!(spec.volumes.is_empty());
}

#[test]
fn authentication_only_adds_sasl_lines() {
    let ssl = builder().build_consumer_spec(
        "hello",
        "topic",
        10,
        &SecurityProfile::new(Transport::Tls, None),
    );
    let sasl_ssl = builder().build_consumer_spec(
        "hello",
        "topic",
        10,
        &SecurityProfile::new(Transport::Tls, Some(alice())),
    );

    let ssl_config = ssl.env_value("CONSUMER_CONFIGURATION").unwrap();
    let sasl_config = sasl_ssl.env_value("CONSUMER_CONFIGURATION").unwrap();

    assert!(ssl_config.contains("security.protocol=SSL\n"));
    assert!(sasl_config.contains("security.protocol=SASL_SSL\n"));
    assert_eq!(without_sasl_lines(sasl_config), without_sasl_lines(ssl_config));
    assert_eq!(ssl.volumes, sasl_ssl.volumes);
}

#[test]
fn scram_and_certificate_attach_together() {
    let mut identity = alice();
    identity.tls_certificate = true;
    let profile = SecurityProfile::new(Transport::Tls, Some(identity));
    let spec = builder().build_producer_spec("hello", "topic", 10, &profile);

    let config = spec.env_value("PRODUCER_CONFIGURATION").unwrap();
    assert!(config.contains("security.protocol=SASL_SSL\n"));
    assert!(config.contains("sasl.mechanism=SCRAM-SHA-512\n"));
    assert!(config.contains("ssl.truststore.location=/tmp/truststore.p12\n"));
    assert!(config.contains("ssl.keystore.location=/tmp/keystore.p12\n"));

    assert_eq!(tls_volumes(&spec), vec!["alice"]);
    assert!(spec.volume("ca-cert").is_some());
    assert!(spec.tls_client_identity);
    assert_eq!(spec.env_value("KAFKA_USER"), Some("alice"));
}
