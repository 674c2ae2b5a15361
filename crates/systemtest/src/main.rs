//! systemtest CLI - run harness operations against a live cluster.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use systemtest::diagnostics::LogCollector;
use systemtest::naming::kafka_pod_name;
use systemtest::poll::{broker_api_versions, wait_for_job_success};
use systemtest::recovery::{BaselineInstall, EnvironmentRecovery};
use systemtest::workload::{
    scram_identity, ClientIdentity, RestartPolicy, ScramCredentials, SecurityProfile, Transport,
    WorkloadBuilder,
};
use systemtest::{ClusterEnvironment, Error, HarnessConfig, KubeCluster};

/// Verification harness for a Kafka cluster and its operator.
#[derive(Parser)]
#[command(name = "systemtest")]
#[command(about = "Kafka-on-Kubernetes verification harness")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Producer,
    Consumer,
    Ping,
}

#[derive(Clone, Copy, ValueEnum)]
enum Auth {
    Scram,
    Tls,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot events, config maps and container logs of a namespace
    Collect {
        #[arg(long)]
        namespace: String,

        /// Snapshot root (defaults to TEST_LOG_DIR)
        #[arg(long)]
        root: Option<PathBuf>,

        #[arg(long, default_value = "")]
        test_class: String,

        #[arg(long, default_value = "")]
        test_name: String,
    },

    /// Verify a namespace is clean after teardown, rebuilding it if not
    VerifyEnv {
        #[arg(long)]
        namespace: String,

        /// Namespaces that need operator bindings (repeatable)
        #[arg(long = "aux-namespace")]
        aux_namespaces: Vec<String>,

        /// Wait before counting leftover pods (defaults to TEARDOWN_GLOBAL_WAIT_MS)
        #[arg(long)]
        wait_ms: Option<u64>,
    },

    /// Wait for a job to succeed, dumping diagnostics on timeout
    WaitJob {
        #[arg(long)]
        namespace: String,

        #[arg(long)]
        name: String,

        /// Kafka cluster whose user operator logs are dumped on timeout
        #[arg(long, default_value = "my-cluster")]
        cluster: String,
    },

    /// Print the API versions a broker supports once it answers
    BrokerVersions {
        #[arg(long)]
        namespace: String,

        #[arg(long, default_value = "my-cluster")]
        cluster: String,

        /// Broker index within the cluster
        #[arg(long, default_value = "0")]
        broker: u32,
    },

    /// Print the Job a workload would be submitted as
    RenderJob {
        #[arg(long, value_enum)]
        role: Role,

        #[arg(long)]
        name: String,

        #[arg(long)]
        topic: String,

        #[arg(long, default_value = "100")]
        messages: u32,

        #[arg(long, default_value = "my-cluster")]
        cluster: String,

        /// Connect through the TLS listener
        #[arg(long)]
        tls: bool,

        /// User to authenticate as
        #[arg(long)]
        user: Option<String>,

        #[arg(long, value_enum, requires = "user")]
        auth: Option<Auth>,

        /// SCRAM password; read from the user's secret when omitted
        #[arg(long)]
        password: Option<String>,

        /// Namespace of the user's secret
        #[arg(long, default_value = "myproject")]
        namespace: String,

        /// Never restart the workload pod, even when it fails
        #[arg(long)]
        no_restart: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("systemtest=debug,info")
    } else {
        EnvFilter::new("systemtest=info,warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = HarnessConfig::from_env();

    match cli.command {
        Commands::Collect {
            namespace,
            root,
            test_class,
            test_name,
        } => {
            let cluster = KubeCluster::try_default().await?;
            let root = root.unwrap_or_else(|| config.log_dir.clone());
            let report = LogCollector::new(&cluster, namespace, root)
                .collect(&test_class, &test_name)
                .await?;
            println!("{}", report.directory.display());
            for failure in &report.failures {
                error!(failure = %failure, "Artifact not collected");
            }
        }

        Commands::VerifyEnv {
            namespace,
            aux_namespaces,
            wait_ms,
        } => {
            let cluster = KubeCluster::try_default().await?;
            let mut config = config;
            if let Some(ms) = wait_ms {
                config.teardown_wait = std::time::Duration::from_millis(ms);
            }
            let install = BaselineInstall::new(config.install_dir.clone());
            let mut env = ClusterEnvironment::new(namespace.clone(), "systemtest", config);
            let mut recovery = EnvironmentRecovery::new(install);

            match recovery
                .verify_and_recover(&cluster, &mut env, &namespace, &aux_namespaces)
                .await
            {
                Ok(()) => info!(namespace = %namespace, "Environment is clean"),
                Err(e @ Error::EnvironmentInconsistent { .. }) => {
                    bail!("{e}\nThe environment has been recreated.");
                }
                Err(e) => return Err(e).context("Environment recovery failed"),
            }
        }

        Commands::WaitJob {
            namespace,
            name,
            cluster: kafka_cluster,
        } => {
            let cluster = KubeCluster::try_default().await?;
            wait_for_job_success(&cluster, &namespace, &name, &kafka_cluster).await?;
            info!(job = %name, "Job succeeded");
        }

        Commands::BrokerVersions {
            namespace,
            cluster: kafka_cluster,
            broker,
        } => {
            let cluster = KubeCluster::try_default().await?;
            let pod = kafka_pod_name(&kafka_cluster, broker);
            print!("{}", broker_api_versions(&cluster, &namespace, &pod).await?);
        }

        Commands::RenderJob {
            role,
            name,
            topic,
            messages,
            cluster: kafka_cluster,
            tls,
            user,
            auth,
            password,
            namespace,
            no_restart,
        } => {
            let identity = match (user, auth) {
                (None, _) => None,
                (Some(user), None) => Some(ClientIdentity::anonymous(user)),
                (Some(user), Some(Auth::Tls)) => Some(ClientIdentity::tls(user)),
                (Some(user), Some(Auth::Scram)) => Some(match password {
                    Some(password) => ClientIdentity::scram(ScramCredentials {
                        username: user,
                        password,
                    }),
                    None => {
                        let cluster = KubeCluster::try_default().await?;
                        scram_identity(&cluster, &namespace, &user).await?
                    }
                }),
            };
            let profile = SecurityProfile::new(Transport::from_tls(tls), identity);
            let builder = WorkloadBuilder::new(kafka_cluster, &config);
            let mut spec = match role {
                Role::Producer => builder.build_producer_spec(&name, &topic, messages, &profile),
                Role::Consumer => builder.build_consumer_spec(&name, &topic, messages, &profile),
                Role::Ping => builder.build_combined_spec(&name, &topic, messages, &profile),
            };
            if no_restart {
                spec.restart_policy = RestartPolicy::Never;
            }
            print!("{}", serde_yaml::to_string(&spec.to_job()?)?);
        }
    }

    Ok(())
}
