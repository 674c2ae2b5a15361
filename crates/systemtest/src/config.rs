//! Harness configuration and timing constants.

use std::path::PathBuf;
use std::time::Duration;

/// Default cadence for every cluster-state poll.
pub const GLOBAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for every cluster-state poll.
pub const GLOBAL_TIMEOUT: Duration = Duration::from_secs(300);

/// How long teardown waits before counting leftover pods.
pub const TEARDOWN_GLOBAL_WAIT: Duration = Duration::from_secs(10);

pub const ENSEMBLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const ENSEMBLE_TIMEOUT: Duration = Duration::from_secs(120);

pub const BROKER_API_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const BROKER_API_TIMEOUT: Duration = Duration::from_secs(60);

/// Pods whose name starts with this prefix belong to the operator install
/// and survive teardown.
pub const CLUSTER_OPERATOR_PREFIX: &str = "strimzi";

pub const DEFAULT_LOG_DIR: &str = "target/logs";
pub const DEFAULT_DOCKER_ORG: &str = "strimzi";
pub const DEFAULT_DOCKER_TAG: &str = "latest";
pub const DEFAULT_INSTALL_DIR: &str = "../install/cluster-operator";
pub const DEFAULT_NAMESPACE: &str = "myproject";

/// Runtime configuration for the harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Root directory for diagnostic snapshots.
    pub log_dir: PathBuf,
    /// Image organisation substituted for `strimzi/` in client images.
    pub docker_org: String,
    /// Image tag substituted for `latest` in client images.
    pub docker_tag: String,
    /// Directory holding the operator's baseline installation manifests.
    pub install_dir: PathBuf,
    /// Namespace the environment falls back to while its own is rebuilt.
    pub default_namespace: String,
    /// Wait applied before the post-teardown pod count.
    pub teardown_wait: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            docker_org: DEFAULT_DOCKER_ORG.to_string(),
            docker_tag: DEFAULT_DOCKER_TAG.to_string(),
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            teardown_wait: TEARDOWN_GLOBAL_WAIT,
        }
    }
}

impl HarnessConfig {
    /// Create configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `TEST_LOG_DIR`: diagnostic root (default: target/logs)
    /// - `DOCKER_ORG`: client image organisation (default: strimzi)
    /// - `DOCKER_TAG`: client image tag (default: latest)
    /// - `CO_INSTALL_DIR`: baseline manifests (default: ../install/cluster-operator)
    /// - `STRIMZI_DEFAULT_NAMESPACE`: fallback namespace (default: myproject)
    /// - `TEARDOWN_GLOBAL_WAIT_MS`: post-teardown wait (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let teardown_wait = std::env::var("TEARDOWN_GLOBAL_WAIT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.teardown_wait);

        Self {
            log_dir: std::env::var("TEST_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            docker_org: std::env::var("DOCKER_ORG").unwrap_or(defaults.docker_org),
            docker_tag: std::env::var("DOCKER_TAG").unwrap_or(defaults.docker_tag),
            install_dir: std::env::var("CO_INSTALL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.install_dir),
            default_namespace: std::env::var("STRIMZI_DEFAULT_NAMESPACE")
                .unwrap_or(defaults.default_namespace),
            teardown_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "TEST_LOG_DIR",
        "DOCKER_ORG",
        "DOCKER_TAG",
        "CO_INSTALL_DIR",
        "STRIMZI_DEFAULT_NAMESPACE",
        "TEARDOWN_GLOBAL_WAIT_MS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_environment() {
        clear_env();
        let config = HarnessConfig::from_env();
        assert_eq!(config.log_dir, PathBuf::from("target/logs"));
        assert_eq!(config.docker_org, "strimzi");
        assert_eq!(config.docker_tag, "latest");
        assert_eq!(config.default_namespace, "myproject");
        assert_eq!(config.teardown_wait, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear_env();
        std::env::set_var("TEST_LOG_DIR", "/tmp/st-logs");
        std::env::set_var("DOCKER_ORG", "quay.io/acme");
        std::env::set_var("TEARDOWN_GLOBAL_WAIT_MS", "250");

        let config = HarnessConfig::from_env();
        assert_eq!(config.log_dir, PathBuf::from("/tmp/st-logs"));
        assert_eq!(config.docker_org, "quay.io/acme");
        assert_eq!(config.docker_tag, "latest");
        assert_eq!(config.teardown_wait, Duration::from_millis(250));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_wait_falls_back() {
        clear_env();
        std::env::set_var("TEARDOWN_GLOBAL_WAIT_MS", "soon");
        assert_eq!(HarnessConfig::from_env().teardown_wait, TEARDOWN_GLOBAL_WAIT);
        clear_env();
    }
}
