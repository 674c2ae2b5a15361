//! Probes that run commands inside cluster members.

use regex::Regex;
use tracing::{info, trace};

use super::{poll_fn, Poller, Probe};
use crate::cluster::{bash, ClusterApi};
use crate::config::{
    BROKER_API_POLL_INTERVAL, BROKER_API_TIMEOUT, ENSEMBLE_POLL_INTERVAL, ENSEMBLE_TIMEOUT,
};
use crate::diagnostics::indent;
use crate::naming::{zookeeper_member_port, zookeeper_pod_name};
use crate::Result;

fn mntr_command(index: u32) -> Vec<String> {
    bash(format!("echo mntr | nc localhost {}", zookeeper_member_port(index)))
}

/// Wait until the `mntr` output of every listed ensemble member matches `pattern`.
///
/// Members are polled one after another, each with its own deadline. A failed
/// exec counts as not ready. On timeout the member's current output is logged.
pub async fn wait_for_ensemble_status(
    cluster: &dyn ClusterApi,
    namespace: &str,
    kafka_cluster: &str,
    pattern: &Regex,
    members: &[u32],
) -> Result<()> {
    for &index in members {
        let pod = zookeeper_pod_name(kafka_cluster, index);
        let pod = pod.as_str();

        Poller::new("mntr", ENSEMBLE_POLL_INTERVAL, ENSEMBLE_TIMEOUT)?
            .until_or_else(
                poll_fn(move || async move {
                    match cluster.exec(namespace, pod, mntr_command(index)).await {
                        Ok(out) if out.success && pattern.is_match(&out.stdout) => Probe::Ready(()),
                        Ok(out) => {
                            trace!(pod, stderr = %out.stderr, "Ensemble member not ready");
                            Probe::Pending
                        }
                        Err(e) => {
                            trace!(pod, error = %e, "Exec while waiting for ensemble member, ignoring");
                            Probe::Pending
                        }
                    }
                }),
                move || async move {
                    let current = match cluster.exec(namespace, pod, mntr_command(index)).await {
                        Ok(out) => out.stdout,
                        Err(e) => format!("<unavailable: {e}>"),
                    };
                    info!(
                        pod,
                        "mntr output at the point of timeout does not match {}:\n{}",
                        pattern.as_str(),
                        indent(&current)
                    );
                },
            )
            .await?;
    }
    Ok(())
}

/// Run `kafka-broker-api-versions.sh` in `pod` until it succeeds and return its output.
pub async fn broker_api_versions(
    cluster: &dyn ClusterApi,
    namespace: &str,
    pod: &str,
) -> Result<String> {
    let command = vec![
        "/opt/kafka/bin/kafka-broker-api-versions.sh".to_string(),
        "--bootstrap-server".to_string(),
        "localhost:9092".to_string(),
    ];
    Poller::new(
        "kafka-broker-api-versions.sh success",
        BROKER_API_POLL_INTERVAL,
        BROKER_API_TIMEOUT,
    )?
    .until(poll_fn(move || {
        let command = command.clone();
        async move {
            match cluster.exec(namespace, pod, command).await {
                Ok(out) if out.success => Probe::Ready(out.stdout),
                Ok(out) => {
                    trace!(pod, stderr = %out.stderr, "kafka-broker-api-versions.sh failed");
                    Probe::Pending
                }
                Err(e) => {
                    trace!(pod, error = %e, "kafka-broker-api-versions.sh failed");
                    Probe::Pending
                }
            }
        }
    }))
    .await
}
