//! Namespace snapshots written to disk for post-mortem analysis.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use k8s_openapi::api::core::v1::{Event, Pod};
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::Result;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Files produced by one collection and the artifacts that could not be captured.
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub directory: PathBuf,
    pub written: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl CollectionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, artifact: impl Into<String>, error: &crate::Error) {
        let artifact = artifact.into();
        warn!(artifact = %artifact, error = %error, "Collecting diagnostics failed, continuing");
        self.failures.push(format!("{artifact}: {error}"));
    }
}

/// Captures events, config maps and container logs of one namespace.
pub struct LogCollector<'a> {
    cluster: &'a dyn ClusterApi,
    namespace: String,
    root: PathBuf,
}

impl<'a> LogCollector<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, namespace: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            root: root.into(),
        }
    }

    /// Snapshot the namespace into a fresh directory under the root.
    ///
    /// Only failing to create the directory is an error. Each artifact class
    /// is collected independently and its failures land in the report.
    pub async fn collect(&self, test_class: &str, test_name: &str) -> Result<CollectionReport> {
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let directory = create_unique_dir(&snapshot_dir(&self.root, test_class, test_name, &stamp)).await?;
        info!(namespace = %self.namespace, directory = %directory.display(), "Collecting diagnostics");

        let mut report = CollectionReport {
            directory,
            ..Default::default()
        };
        if let Err(e) = self.collect_events(&mut report).await {
            report.fail("events", &e);
        }
        if let Err(e) = self.collect_config_maps(&mut report).await {
            report.fail("configMaps", &e);
        }
        if let Err(e) = self.collect_pod_logs(&mut report).await {
            report.fail("pod logs", &e);
        }
        Ok(report)
    }

    async fn collect_events(&self, report: &mut CollectionReport) -> Result<()> {
        info!(namespace = %self.namespace, "Collecting events");
        let events = self.cluster.list_events(&self.namespace).await?;
        let dir = report.directory.join("events");
        tokio::fs::create_dir_all(&dir).await?;

        let text: String = events.iter().map(|e| format_event(e) + "\n").collect();
        let path = dir.join(format!("events-in-namespace{}.log", self.namespace));
        tokio::fs::write(&path, text).await?;
        report.written.push(path);
        Ok(())
    }

    async fn collect_config_maps(&self, report: &mut CollectionReport) -> Result<()> {
        info!(namespace = %self.namespace, "Collecting configmaps");
        let config_maps = self.cluster.list_config_maps(&self.namespace).await?;
        let dir = report.directory.join("configMaps");
        tokio::fs::create_dir_all(&dir).await?;

        for config_map in config_maps {
            let name = config_map.metadata.name.clone().unwrap_or_default();
            let path = dir.join(format!("{name}-{}.log", self.namespace));
            tokio::fs::write(&path, serde_yaml::to_string(&config_map)?).await?;
            report.written.push(path);
        }
        Ok(())
    }

    async fn collect_pod_logs(&self, report: &mut CollectionReport) -> Result<()> {
        info!(namespace = %self.namespace, "Collecting logs for pods");
        let pods = self.cluster.list_pods(&self.namespace).await?;

        for pod in &pods {
            let pod_name = pod.metadata.name.clone().unwrap_or_default();
            for container in container_names(pod) {
                let path = report
                    .directory
                    .join(format!("logs-pod-{pod_name}-container-{container}.log"));
                let written = async {
                    let log = self
                        .cluster
                        .pod_logs(&self.namespace, &pod_name, Some(container.clone()))
                        .await?;
                    tokio::fs::write(&path, log).await?;
                    Ok::<_, crate::Error>(())
                }
                .await;
                match written {
                    Ok(()) => report.written.push(path),
                    Err(e) => report.fail(format!("log of {pod_name}/{container}"), &e),
                }
            }
        }
        Ok(())
    }
}

/// `<root>/<class>.<name>_<stamp>`, or `<root>/<stamp>` without a test name.
pub(crate) fn snapshot_dir(root: &Path, test_class: &str, test_name: &str, stamp: &str) -> PathBuf {
    if test_name.is_empty() {
        root.join(stamp)
    } else {
        root.join(format!("{test_class}.{test_name}_{stamp}"))
    }
}

/// Create `base`, or `base-1`, `base-2`, ... if it already exists.
async fn create_unique_dir(base: &Path) -> Result<PathBuf> {
    if let Some(parent) = base.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut candidate = base.to_path_buf();
    let mut suffix = 0;
    loop {
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                suffix += 1;
                let mut name = base.as_os_str().to_owned();
                name.push(format!("-{suffix}"));
                candidate = PathBuf::from(name);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn container_names(pod: &Pod) -> Vec<String> {
    let from_status = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
        .unwrap_or_default();
    if !from_status.is_empty() {
        return from_status;
    }
    pod.spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

fn format_event(event: &Event) -> String {
    let timestamp = serde_json::to_value(&event.last_timestamp)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "-".to_string());
    let object = &event.involved_object;
    format!(
        "{timestamp} {} {} {}/{}: {}",
        event.type_.as_deref().unwrap_or("-"),
        event.reason.as_deref().unwrap_or("-"),
        object.kind.as_deref().unwrap_or("-"),
        object.name.as_deref().unwrap_or("-"),
        event.message.as_deref().unwrap_or("").trim_end(),
    )
}
