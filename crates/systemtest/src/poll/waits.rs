use tracing::{debug, info};

use super::{poll_fn, Poller, Probe};
use crate::cluster::ClusterApi;
use crate::Result;

fn lookup_state<T>(what: &str, result: Result<Option<T>>, want_present: bool) -> Probe<()> {
    match result {
        Ok(found) => Probe::from(found.is_some() == want_present),
        Err(e) => {
            debug!(what, error = %e, "Lookup failed, retrying");
            Probe::Pending
        }
    }
}

/// Wait until the secret `name` exists.
pub async fn wait_for_secret(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> Result<()> {
    Poller::global(format!("secret {name} exists"))?
        .until(poll_fn(move || async move {
            lookup_state(name, cluster.get_secret(namespace, name).await, true)
        }))
        .await
}

/// Wait until the pod `name` is gone.
pub async fn wait_for_pod_deletion(cluster: &dyn ClusterApi, namespace: &str, name: &str) -> Result<()> {
    info!(pod = name, "Waiting for Pod deletion");
    Poller::global(format!("pod {name} deletion"))?
        .until(poll_fn(move || async move {
            lookup_state(name, cluster.get_pod(namespace, name).await, false)
        }))
        .await
}

/// Wait until the namespace `name` no longer exists.
pub async fn wait_for_namespace_deletion(cluster: &dyn ClusterApi, name: &str) -> Result<()> {
    info!(namespace = name, "Waiting for Namespace deletion");
    Poller::global(format!("namespace {name} deletion"))?
        .until(poll_fn(move || async move {
            match cluster.namespace_exists(name).await {
                Ok(exists) => Probe::from(!exists),
                Err(e) => {
                    debug!(namespace = name, error = %e, "Lookup failed, retrying");
                    Probe::Pending
                }
            }
        }))
        .await
}
