//! Builds, waits on and tears down a local cluster.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::clean::{CleanReport, delete_tree};
use crate::config::{CONFIG_DIR, ENGINE_CONFIG_FILE, LOGGING_CONFIG_FILE, PLUGINS_DIR};
use crate::engine::{EngineClient, EngineLauncher};
use crate::fleet::{CloseReport, Fleet};
use crate::health::{HealthResult, HealthTarget, HealthWaiter};
use crate::policy::Escalation;
use crate::{ClusterConfig, Error, NodeConfig, NodeHandle, Result};

const DEFAULT_ENGINE_CONFIG: &str = include_str!("../resources/engine.yml");
const DEFAULT_LOGGING_CONFIG: &str = include_str!("../resources/logging.yml");

const TEMP_BASE_PREFIX: &str = "engine-cluster";
const RULE: &str = "----------------------------------------";

/// A local cluster owned by this process.
///
/// Node 0 of the fleet is the coordinator: every health wait and operation
/// goes through its client.
pub struct ClusterRunner {
    /// Resolved configuration; `base_path` is always set.
    config: ClusterConfig,
    base_path: PathBuf,
    escalation: Escalation,
    fleet: Fleet,
}

impl ClusterRunner {
    /// Prepares the base path and starts every node.
    pub fn build(config: ClusterConfig, launcher: impl EngineLauncher + 'static) -> Result<Self> {
        let mut runner = Self::prepare(config, launcher)?;
        runner.start_nodes()?;
        Ok(runner)
    }

    /// Validates the configuration and lays out the base path without
    /// starting any node.
    pub fn prepare(config: ClusterConfig, launcher: impl EngineLauncher + 'static) -> Result<Self> {
        config.validate()?;

        let base_path = match &config.base_path {
            Some(path) => path.clone(),
            None => create_temp_base()?,
        };
        let config = ClusterConfig {
            base_path: Some(base_path.clone()),
            ..config
        };
        let escalation = Escalation::new(config.failure_policy, config.output);

        let runner = Self {
            config,
            base_path,
            escalation,
            fleet: Fleet::new(Box::new(launcher)),
        };
        runner.lay_out_base_path()?;

        runner.print(RULE);
        runner.print(&format!("Cluster Name: {}", runner.config.cluster_name));
        runner.print(&format!("Base Path:    {}", runner.base_path.display()));
        runner.print(&format!("Num Of Node:  {}", runner.config.node_count));
        runner.print(RULE);

        Ok(runner)
    }

    /// Starts the nodes not yet started, in ascending index order.
    ///
    /// Stops at the first failure; nodes already started stay in the fleet.
    pub fn start_nodes(&mut self) -> Result<()> {
        for index in (self.fleet.size() + 1)..=self.config.node_count {
            let node = self.config.allocate(&self.base_path, index);
            self.print_node(&node);
            self.fleet.start_node(node)?;
        }
        info!(
            cluster = %self.config.cluster_name,
            nodes = self.fleet.size(),
            "cluster started"
        );
        Ok(())
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Node at `position` in start order (node index `position + 1`).
    pub fn node(&self, position: usize) -> Result<&NodeHandle> {
        self.fleet.get(position)
    }

    pub fn node_size(&self) -> usize {
        self.fleet.size()
    }

    /// Client of the coordinator node.
    pub fn client(&self) -> Result<&dyn EngineClient> {
        Ok(self.fleet.coordinator()?.client())
    }

    /// True once every node is closed.
    pub fn is_closed(&self) -> bool {
        self.fleet.is_all_closed()
    }

    /// Closes every node. Safe to call more than once and from another
    /// thread than the one polling [`ClusterRunner::is_closed`].
    pub fn close(&self) -> CloseReport {
        let report = self.fleet.close_all();
        self.print("Closed all nodes.");
        report
    }

    /// Deletes the whole base path. Close the nodes first.
    pub fn clean(&self) -> Result<CleanReport> {
        if !self.is_closed() {
            warn!(
                base_path = %self.base_path.display(),
                "cleaning base path while nodes are still running"
            );
        }

        match delete_tree(&self.base_path) {
            Ok(report) => {
                self.print(&format!("Deleted {}", self.base_path.display()));
                Ok(report)
            }
            Err(e) => {
                self.print(&format!("Failed to delete {}", self.base_path.display()));
                Err(e)
            }
        }
    }

    /// Waits for `indices` (all when empty) to turn green.
    pub fn ensure_green(&self, indices: &[&str]) -> Result<HealthResult> {
        self.health_waiter()?
            .wait_for_status(indices, HealthTarget::Green)
    }

    /// Waits for `indices` (all when empty) to turn at least yellow.
    pub fn ensure_yellow(&self, indices: &[&str]) -> Result<HealthResult> {
        self.health_waiter()?
            .wait_for_status(indices, HealthTarget::Yellow)
    }

    /// Waits until no shard is relocating.
    pub fn wait_for_relocation(&self) -> Result<HealthResult> {
        self.health_waiter()?.wait_for_no_relocation()
    }

    pub(crate) fn escalation(&self) -> &Escalation {
        &self.escalation
    }

    pub(crate) fn print(&self, line: &str) {
        self.escalation.sink().print(line);
    }

    fn health_waiter(&self) -> Result<HealthWaiter<'_>> {
        Ok(HealthWaiter::new(
            self.client()?,
            self.escalation,
            self.config.health_timeout(),
        ))
    }

    fn lay_out_base_path(&self) -> Result<()> {
        let config_dir = self.base_path.join(CONFIG_DIR);

        self.create_dir(&self.base_path)?;
        self.create_dir(&config_dir)?;
        self.create_dir(&self.base_path.join(PLUGINS_DIR))?;

        install_default(&config_dir.join(ENGINE_CONFIG_FILE), DEFAULT_ENGINE_CONFIG)?;
        install_default(&config_dir.join(LOGGING_CONFIG_FILE), DEFAULT_LOGGING_CONFIG)?;

        self.config.save(&self.base_path)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        self.print(&format!("Creating {}", path.display()));
        fs::create_dir_all(path)
            .map_err(|e| Error::Config(format!("failed to create {}: {e}", path.display())))
    }

    fn print_node(&self, node: &NodeConfig) {
        self.print(&format!("Node Name:      {}", node.name));
        self.print(&format!("HTTP Port:      {}", node.http_port));
        self.print(&format!("Transport Port: {}", node.transport_port));
        self.print(&format!("Data Directory: {}", node.data_path.display()));
        self.print(&format!("Log Directory:  {}", node.logs_path.display()));
        self.print(RULE);
    }
}

fn create_temp_base() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(TEMP_BASE_PREFIX)
        .tempdir()
        .map_err(|e| Error::Config(format!("could not create a base path: {e}")))?;
    Ok(dir.keep())
}

/// Writes a bundled default config file unless one is already there.
fn install_default(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::write(path, contents)
        .map_err(|e| Error::Config(format!("could not create {}: {e}", path.display())))
}
