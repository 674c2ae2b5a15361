//! Error types for the systemtest harness.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the harness to test scenarios.
#[derive(Error, Debug)]
pub enum Error {
    /// A polled condition was never satisfied before its deadline.
    #[error("Timeout after {timeout:?} waiting for {description}")]
    TimedOut {
        description: String,
        timeout: Duration,
    },

    /// A polled condition observed a terminal bad state. Never retried.
    #[error("{description} failed: {reason}")]
    HardFailure { description: String, reason: String },

    /// A required secret or field is missing; the test setup is broken.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Resources were left behind after teardown. The environment has been
    /// rebuilt, but the scenario that left them still fails.
    #[error("There are some unexpected pods in namespace {namespace}! Cleanup is not finished properly!{}", format_leftovers(.leftovers))]
    EnvironmentInconsistent {
        namespace: String,
        leftovers: Vec<String>,
    },

    #[error("Invalid poll settings: {0}")]
    InvalidPollSettings(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("Command execution failed: {0}")]
    Exec(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// True for harness-level and API-level "does not exist" errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

fn format_leftovers(leftovers: &[String]) -> String {
    leftovers.iter().map(|pod| format!("\n{pod}")).collect()
}
