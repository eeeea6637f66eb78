//! Cluster runner CLI.
//!
//! Starts a local multi-node cluster in this process and keeps it serving
//! until interrupted.
//!
//! ```bash
//! # Three nodes under a fresh temporary directory
//! cluster-runner
//!
//! # Five nodes under ./es, transport ports 9401..=9405
//! cluster-runner --base-path ./es --num-of-node 5 --base-transport-port 9400
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use cluster_runner::config::{
    DEFAULT_BASE_HTTP_PORT, DEFAULT_BASE_TRANSPORT_PORT, DEFAULT_CLUSTER_NAME,
    DEFAULT_INDEX_STORE_TYPE, DEFAULT_NODE_COUNT,
};
use cluster_runner::{ClusterConfig, ClusterRunner, FailurePolicy, MemoryEngine, OutputSink};
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runs a local multi-node cluster in-process for development and testing.
#[derive(Parser, Debug)]
#[command(name = "cluster-runner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base path for the cluster (a temporary directory when omitted).
    #[arg(long, alias = "basePath")]
    base_path: Option<PathBuf>,

    /// Number of nodes to start.
    #[arg(long, alias = "numOfNode", default_value_t = DEFAULT_NODE_COUNT)]
    num_of_node: usize,

    /// Base transport port (node N listens on base + N).
    #[arg(long, alias = "baseTransportPort", default_value_t = DEFAULT_BASE_TRANSPORT_PORT)]
    base_transport_port: u16,

    /// Base HTTP port (node N listens on base + N).
    #[arg(long, alias = "baseHttpPort", default_value_t = DEFAULT_BASE_HTTP_PORT)]
    base_http_port: u16,

    /// Cluster name.
    #[arg(long, alias = "clusterName", default_value = DEFAULT_CLUSTER_NAME)]
    cluster_name: String,

    /// Index store type.
    #[arg(long, alias = "indexStoreType", default_value = DEFAULT_INDEX_STORE_TYPE)]
    index_store_type: String,

    /// Print runner messages to stdout instead of the log.
    #[arg(long, alias = "useStdOut", default_value_t = true, action = ArgAction::Set)]
    use_std_out: bool,

    /// Fail on a timed-out health wait or a failed operation instead of
    /// only reporting it.
    #[arg(long, alias = "throwOnFailure", default_value_t = true, action = ArgAction::Set)]
    throw_on_failure: bool,

    /// Engine-side deadline for health waits, in seconds.
    #[arg(long, default_value_t = 30)]
    health_timeout_secs: u64,

    /// Delete the base path once all nodes are closed.
    #[arg(long)]
    clean_on_exit: bool,
}

impl Cli {
    fn cluster_config(&self) -> ClusterConfig {
        let mut config = ClusterConfig::new(self.num_of_node)
            .with_cluster_name(&self.cluster_name)
            .with_base_transport_port(self.base_transport_port)
            .with_base_http_port(self.base_http_port)
            .with_index_store_type(&self.index_store_type)
            .with_failure_policy(FailurePolicy::from_throw_on_failure(self.throw_on_failure))
            .with_output(OutputSink::from_use_std_out(self.use_std_out))
            .with_health_timeout(Duration::from_secs(self.health_timeout_secs));
        if let Some(path) = &self.base_path {
            config = config.with_base_path(path);
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let runner = ClusterRunner::build(cli.cluster_config(), MemoryEngine::new())
        .context("Failed to build cluster")?;
    let runner = Arc::new(runner);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(Arc::clone(&runner)));

    if cli.clean_on_exit {
        runner.clean().context("Failed to clean base path")?;
    }

    Ok(())
}

/// Blocks until every node is closed, closing them all on Ctrl+C.
async fn serve(runner: Arc<ClusterRunner>) {
    let hook = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, closing all nodes");
                    let report = runner.close();
                    for (index, e) in &report.failures {
                        error!("Failed to close node {index}: {e}");
                    }
                }
                Err(e) => error!("Unable to listen for shutdown signal: {e}"),
            }
        })
    };

    let mut tick = interval(POLL_INTERVAL);
    loop {
        tick.tick().await;
        if runner.is_closed() {
            break;
        }
    }

    hook.abort();
}
