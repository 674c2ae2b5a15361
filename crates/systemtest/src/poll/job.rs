//! Waiting for batch jobs to run to completion.

use k8s_openapi::api::batch::v1::JobStatus;
use tracing::{debug, info, warn};

use super::{Condition, Poller, Probe};
use crate::cluster::ClusterApi;
use crate::diagnostics::{run_isolated, DiagnosticTask};
use crate::naming::entity_operator_selector;
use crate::{Error, Result};

/// Classify a job status.
///
/// Priority: any failed replica is terminal, one succeeded replica is done,
/// active replicas mean keep waiting. A missing or empty status also means
/// keep waiting and is logged as indeterminate.
pub fn job_state(status: Option<&JobStatus>) -> Probe<()> {
    let Some(status) = status else {
        debug!("Job has no status yet");
        return Probe::Pending;
    };
    if let Some(failed) = status.failed.filter(|n| *n > 0) {
        return Probe::Failed(format!("{failed} failed replica(s)"));
    }
    if status.succeeded.is_some_and(|n| n >= 1) {
        return Probe::Ready(());
    }
    if status.active.is_some_and(|n| n > 0) {
        return Probe::Pending;
    }
    debug!(?status, "Job in indeterminate state");
    Probe::Pending
}

/// Condition satisfied when the named job reports a succeeded replica.
pub struct JobCompletion<'a> {
    cluster: &'a dyn ClusterApi,
    namespace: &'a str,
    job: &'a str,
}

impl<'a> JobCompletion<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, namespace: &'a str, job: &'a str) -> Self {
        Self {
            cluster,
            namespace,
            job,
        }
    }
}

impl Condition for JobCompletion<'_> {
    type Output = ();

    async fn evaluate(&mut self) -> Probe<()> {
        match self.cluster.get_job(self.namespace, self.job).await {
            Ok(Some(job)) => job_state(job.status.as_ref()),
            Ok(None) => {
                debug!(job = self.job, "Job not visible yet");
                Probe::Pending
            }
            Err(e) => {
                warn!(job = self.job, error = %e, "Failed to read job");
                Probe::Pending
            }
        }
    }
}

/// Name of the single pod matching `selector`.
async fn single_pod_name(cluster: &dyn ClusterApi, namespace: &str, selector: &str) -> Result<String> {
    let pods = cluster.list_pods_with_labels(namespace, selector).await?;
    match pods.as_slice() {
        [pod] => pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::not_found("Pod", selector)),
        _ => Err(Error::HardFailure {
            description: format!("Locating pod with labels {selector}"),
            reason: format!("There are {} pods with labels {selector}", pods.len()),
        }),
    }
}

/// Pod spawned by a harness job (selected by its `job=<name>` label).
pub async fn job_pod_name(cluster: &dyn ClusterApi, namespace: &str, job: &str) -> Result<String> {
    single_pod_name(cluster, namespace, &format!("job={job}")).await
}

/// Wait for `job` to succeed.
///
/// A failed replica aborts at once. On timeout the job, its pod, the pod's
/// log and the user operator's log are dumped before the timeout is returned.
pub async fn wait_for_job_success(
    cluster: &dyn ClusterApi,
    namespace: &str,
    job: &str,
    kafka_cluster: &str,
) -> Result<()> {
    debug!(job, namespace, "Waiting for Job completion");
    Poller::global("Job completion")?
        .until_or_else(JobCompletion::new(cluster, namespace, job), move || async move {
            info!(job, "Job timed out, collecting diagnostics");
            run_isolated(job_timeout_diagnostics(cluster, namespace, job, kafka_cluster)).await;
        })
        .await
}

fn job_timeout_diagnostics<'a>(
    cluster: &'a dyn ClusterApi,
    namespace: &'a str,
    job: &'a str,
    kafka_cluster: &'a str,
) -> Vec<DiagnosticTask<'a>> {
    vec![
        DiagnosticTask::new("Job", async move {
            let found = cluster
                .get_job(namespace, job)
                .await?
                .ok_or_else(|| Error::not_found("Job", job))?;
            Ok(serde_yaml::to_string(&found)?)
        }),
        DiagnosticTask::new("Pod", async move {
            let pod_name = job_pod_name(cluster, namespace, job).await?;
            let pod = cluster
                .get_pod(namespace, &pod_name)
                .await?
                .ok_or_else(|| Error::not_found("Pod", pod_name))?;
            Ok(serde_yaml::to_string(&pod)?)
        }),
        DiagnosticTask::new("Job Pod logs", async move {
            let pod_name = job_pod_name(cluster, namespace, job).await?;
            cluster.pod_logs(namespace, &pod_name, None).await
        }),
        DiagnosticTask::new("User Operator Pod logs", async move {
            let selector = entity_operator_selector(kafka_cluster);
            let pod_name = single_pod_name(cluster, namespace, &selector).await?;
            cluster
                .pod_logs(namespace, &pod_name, Some("user-operator".to_string()))
                .await
        }),
    ]
}
