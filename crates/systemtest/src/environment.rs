//! Per-test-class cluster context.

use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::config::HarnessConfig;
use crate::diagnostics::{CollectionReport, LogCollector};
use crate::tracker::ResourceTracker;
use crate::Result;

/// The active namespace and the resources created for a test class.
///
/// Threaded explicitly through every operation that needs to know where it
/// acts; scenarios against one environment run one at a time.
#[derive(Debug)]
pub struct ClusterEnvironment {
    namespace: String,
    test_class: String,
    test_name: String,
    config: HarnessConfig,
    class_resources: ResourceTracker,
    resources: ResourceTracker,
}

impl ClusterEnvironment {
    pub fn new(namespace: impl Into<String>, test_class: impl Into<String>, config: HarnessConfig) -> Self {
        Self {
            namespace: namespace.into(),
            test_class: test_class.into(),
            test_name: String::new(),
            config,
            class_resources: ResourceTracker::new(),
            resources: ResourceTracker::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn test_class(&self) -> &str {
        &self.test_class
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Start a scenario.
    pub fn begin_test(&mut self, test_name: impl Into<String>) {
        self.test_name = test_name.into();
    }

    /// Make `namespace` active and return the previously active one.
    pub fn switch_namespace(&mut self, namespace: impl Into<String>) -> String {
        let previous = std::mem::replace(&mut self.namespace, namespace.into());
        info!(from = %previous, to = %self.namespace, "Switching namespace");
        previous
    }

    /// Resources living as long as the test class.
    pub fn class_resources(&mut self) -> &mut ResourceTracker {
        &mut self.class_resources
    }

    /// Resources living as long as the current scenario.
    pub fn resources(&mut self) -> &mut ResourceTracker {
        &mut self.resources
    }

    /// Forget class resources after their namespace was rebuilt from scratch.
    pub(crate) fn reset_class_resources(&mut self) {
        self.class_resources = ResourceTracker::new();
    }

    /// Snapshot the active namespace under the configured log directory.
    pub async fn collect_logs(&self, cluster: &dyn ClusterApi) -> Result<CollectionReport> {
        LogCollector::new(cluster, self.namespace.clone(), self.config.log_dir.clone())
            .collect(&self.test_class, &self.test_name)
            .await
    }

    /// End a scenario: collect logs if it failed, then delete its resources.
    ///
    /// Log collection problems are logged and dropped; deletion errors propagate.
    pub async fn teardown_test(&mut self, cluster: &dyn ClusterApi, failed: bool) -> Result<()> {
        if failed {
            match self.collect_logs(cluster).await {
                Ok(report) if !report.is_complete() => {
                    warn!(failures = ?report.failures, "Log collection incomplete");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Log collection failed"),
            }
        }
        let deleted = self.resources.delete_all(cluster).await?;
        info!(test = %self.test_name, deleted, "Scenario resources deleted");
        self.test_name.clear();
        Ok(())
    }

    /// End the test class by deleting its resources.
    pub async fn teardown_class(&mut self, cluster: &dyn ClusterApi) -> Result<()> {
        let deleted = self.class_resources.delete_all(cluster).await?;
        info!(class = %self.test_class, deleted, "Class resources deleted");
        Ok(())
    }
}
