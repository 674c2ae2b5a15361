//! Resource lifecycle tracking.
//!
//! Every object the harness creates is recorded here so that teardown can
//! delete it even when the test body bailed out early.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cluster::ClusterApi;
use crate::{Error, Result};

/// Identity of an object the harness created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedResource {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl TrackedResource {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn job(namespace: &str, name: &str) -> Self {
        Self::new("batch/v1", "Job", Some(namespace), name)
    }

    pub fn deployment(namespace: &str, name: &str) -> Self {
        Self::new("apps/v1", "Deployment", Some(namespace), name)
    }

    /// Identity of a rendered manifest. Namespaced kinds without an explicit
    /// namespace are attributed to `default_namespace`.
    pub fn from_manifest(manifest: &Value, default_namespace: &str) -> Result<Self> {
        let field = |pointer: &str| {
            manifest
                .pointer(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Configuration(format!("manifest lacks {pointer}")))
        };
        let kind = field("/kind")?;
        let namespace = if is_cluster_scoped(kind) {
            None
        } else {
            Some(
                manifest
                    .pointer("/metadata/namespace")
                    .and_then(Value::as_str)
                    .unwrap_or(default_namespace),
            )
        };
        Ok(Self::new(
            field("/apiVersion")?,
            kind,
            namespace,
            field("/metadata/name")?,
        ))
    }
}

impl std::fmt::Display for TrackedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} in {}", self.kind, self.name, ns),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Kinds the harness creates that have no namespace.
pub fn is_cluster_scoped(kind: &str) -> bool {
    matches!(
        kind,
        "Namespace" | "ClusterRole" | "ClusterRoleBinding" | "CustomResourceDefinition"
    )
}

/// Ordered record of created resources, deleted newest first.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    resources: Vec<TrackedResource>,
}

impl ResourceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource. Tracking the same resource twice is a no-op.
    pub fn track(&mut self, resource: TrackedResource) {
        if self.resources.contains(&resource) {
            return;
        }
        debug!(resource = %resource, "Tracking resource for teardown");
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedResource> {
        self.resources.iter()
    }

    /// Delete everything tracked, newest first.
    ///
    /// Every resource is attempted even after a failure. Resources that could
    /// not be deleted stay tracked, in their original order, so a second call
    /// retries them; the first error is returned once the sweep is done.
    pub async fn delete_all(&mut self, cluster: &dyn ClusterApi) -> Result<usize> {
        let mut deleted = 0;
        let mut first_error = None;
        let mut kept = Vec::new();
        while let Some(resource) = self.resources.pop() {
            info!(resource = %resource, "Deleting resource");
            match cluster.delete(&resource).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Deletion failed, keeping resource tracked");
                    first_error.get_or_insert(e);
                    kept.push(resource);
                }
            }
        }
        kept.reverse();
        self.resources = kept;
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }
}
