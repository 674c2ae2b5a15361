//! Verification harness for a Kafka cluster and its operator on Kubernetes.
//!
//! Scenarios build ephemeral client workloads ([`workload`]), wait for cluster
//! state with bounded polls ([`poll`]), snapshot namespaces when something goes
//! wrong ([`diagnostics`]) and verify the environment is clean after teardown
//! ([`recovery`]).

pub mod cluster;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod naming;
pub mod poll;
pub mod recovery;
pub mod tracker;
pub mod verify;
pub mod workload;

pub use cluster::{ClusterApi, ExecOutput, KubeCluster};
pub use config::HarnessConfig;
pub use environment::ClusterEnvironment;
pub use error::{Error, Result};
pub use poll::{await_condition, await_condition_or_fail, Condition, Poller, Probe};
pub use recovery::{BaselineInstall, EnvironmentRecovery, RecoveryState};
pub use tracker::{ResourceTracker, TrackedResource};
pub use workload::{SecurityProfile, WorkloadBuilder, WorkloadSpec};
