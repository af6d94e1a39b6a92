//! batchlet CLI - run Kubernetes pods as batch tasks.

use std::io::{Read, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::core::v1::{Node, NodeSpec, NodeStatus, NodeSystemInfo, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use batchlet_client::RestBatchClient;
use batchlet_core::TaskId;
use batchlet_provider::{
    BatchProvider, Config, LogStream, NodeConfig, NodeInfo, DEFAULT_NAMESPACE,
};

/// batchlet - pods on a batch pool
#[derive(Parser)]
#[command(name = "batchlet")]
#[command(about = "Run Kubernetes pods as batch tasks", long_about = None)]
struct Cli {
    /// REST API version to use instead of the built-in one
    #[arg(long)]
    api_version: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a pod from a JSON manifest
    Create {
        /// Path to the pod manifest, or - for stdin
        #[arg(short, long)]
        file: String,
    },

    /// Replace a pod from a JSON manifest
    Update {
        /// Path to the pod manifest, or - for stdin
        #[arg(short, long)]
        file: String,
    },

    /// Delete a pod
    Delete {
        /// Pod name
        name: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Print a pod with its current status
    Get {
        /// Pod name
        name: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Print the status of a pod
    Status {
        /// Pod name
        name: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// List all pods
    List,

    /// Print the output of a pod
    Logs {
        /// Pod name
        name: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Container whose output to print; without it the task's own
        /// output is printed
        #[arg(short, long)]
        container: Option<String>,

        /// Task output stream, used when no container is given
        #[arg(long, value_enum, default_value_t = Stream::Stdout)]
        stream: Stream,

        /// Only print the last N lines of a container's output
        #[arg(long)]
        tail: Option<usize>,
    },

    /// Print the virtual node
    Node,

    /// Print the task id a pod maps to
    #[command(name = "task-id")]
    TaskId {
        /// Pod name
        name: String,

        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Stream {
    Stdout,
    Stderr,
}

impl From<Stream> for LogStream {
    fn from(stream: Stream) -> Self {
        match stream {
            Stream::Stdout => LogStream::Stdout,
            Stream::Stderr => LogStream::Stderr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("batchlet_provider=info,batchlet_client=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::TaskId { name, namespace } => {
            println!("{}", TaskId::for_pod(namespace, name));
            return Ok(());
        }
        Commands::Node => {
            let node = NodeConfig::from_env()?;
            print_json(&node_object(&NodeInfo::new(node)))?;
            return Ok(());
        }
        _ => {}
    }

    let config = Config::from_env()?;
    let mut client = RestBatchClient::new(
        &config.batch_url(),
        config.access_token()?,
        config.request_timeout(),
    )?;
    if let Some(api_version) = cli.api_version {
        client = client.with_api_version(api_version);
    }

    let provider = BatchProvider::new(config, Arc::new(client)).await?;

    match cli.command {
        Commands::Create { file } => {
            let pod = read_pod(&file)?;
            provider.create_pod(&pod).await?;
            print_json(&pod)?;
        }
        Commands::Update { file } => {
            let pod = read_pod(&file)?;
            provider.update_pod(&pod).await?;
            print_json(&pod)?;
        }
        Commands::Delete { name, namespace } => {
            provider.delete_pod_by_name(&namespace, &name).await?;
            println!("pod {namespace}/{name} deleted");
        }
        Commands::Get { name, namespace } => match provider.get_pod(&namespace, &name).await? {
            Some(pod) => print_json(&pod)?,
            None => return Err(format!("pod {namespace}/{name} not found").into()),
        },
        Commands::Status { name, namespace } => {
            match provider.get_pod_status(&namespace, &name).await? {
                Some(status) => print_json(&status)?,
                None => return Err(format!("pod {namespace}/{name} not found").into()),
            }
        }
        Commands::List => {
            let list = provider.get_pods().await?;
            for failure in &list.failures {
                warn!(task_id = %failure.task_id, error = %failure.error, "Task skipped");
            }
            print_json(&list.pods)?;
        }
        Commands::Logs {
            name,
            namespace,
            container,
            stream,
            tail,
        } => {
            let bytes = match container {
                Some(container) => {
                    provider
                        .get_container_logs(&namespace, &name, &container, tail)
                        .await?
                }
                None => {
                    provider
                        .get_task_output(&namespace, &name, stream.into())
                        .await?
                }
            };
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        Commands::Node | Commands::TaskId { .. } => {}
    }

    Ok(())
}

/// Read a pod manifest, assigning a UID when it has none.
fn read_pod(path: &str) -> Result<Pod, Box<dyn std::error::Error>> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };

    let mut pod: Pod = serde_json::from_str(&raw)?;
    if pod.metadata.uid.as_deref().map_or(true, str::is_empty) {
        let uid = uuid::Uuid::new_v4().to_string();
        info!(uid = %uid, "Assigned pod UID");
        pod.metadata.uid = Some(uid);
    }
    Ok(pod)
}

fn node_object(node: &NodeInfo) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(node.name().to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            capacity: Some(node.capacity()),
            allocatable: Some(node.capacity()),
            conditions: Some(node.conditions()),
            addresses: Some(node.addresses()),
            daemon_endpoints: Some(node.daemon_endpoints()),
            node_info: Some(NodeSystemInfo {
                operating_system: node.operating_system().to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
