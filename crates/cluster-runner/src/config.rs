//! Cluster configuration and per-node resource allocation.

use crate::{Error, FailurePolicy, OutputSink, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLUSTER_NAME: &str = "elasticsearch-cluster-runner";
pub const DEFAULT_NODE_COUNT: usize = 3;
pub const DEFAULT_BASE_TRANSPORT_PORT: u16 = 9300;
pub const DEFAULT_BASE_HTTP_PORT: u16 = 9200;
pub const DEFAULT_INDEX_STORE_TYPE: &str = "default";
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 30_000;

pub const CONFIG_DIR: &str = "config";
pub const PLUGINS_DIR: &str = "plugins";
pub const DATA_DIR: &str = "data";
pub const LOGS_DIR: &str = "logs";
pub const WORK_DIR: &str = "work";

pub const ENGINE_CONFIG_FILE: &str = "engine.yml";
pub const LOGGING_CONFIG_FILE: &str = "logging.yml";
pub const CLUSTER_FILE: &str = "cluster.toml";

/// Configuration for a local cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster name every node joins.
    pub cluster_name: String,

    /// Number of nodes in the cluster.
    pub node_count: usize,

    /// Base transport port (node N uses base_transport_port + N).
    pub base_transport_port: u16,

    /// Base HTTP port (node N uses base_http_port + N).
    pub base_http_port: u16,

    /// Root directory for the cluster. A temporary directory is created
    /// when unset.
    pub base_path: Option<PathBuf>,

    /// Index store type handed to every node.
    pub index_store_type: String,

    /// What happens when a health wait times out or an operation fails.
    pub failure_policy: FailurePolicy,

    /// Where runner messages go.
    pub output: OutputSink,

    /// Engine-side deadline for health waits, in milliseconds.
    pub health_timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            node_count: DEFAULT_NODE_COUNT,
            base_transport_port: DEFAULT_BASE_TRANSPORT_PORT,
            base_http_port: DEFAULT_BASE_HTTP_PORT,
            base_path: None,
            index_store_type: DEFAULT_INDEX_STORE_TYPE.to_string(),
            failure_policy: FailurePolicy::default(),
            output: OutputSink::default(),
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
        }
    }
}

/// Configuration for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node index (1-based).
    pub index: usize,

    pub name: String,
    pub cluster_name: String,
    pub transport_port: u16,
    pub http_port: u16,

    pub data_path: PathBuf,
    pub logs_path: PathBuf,
    pub work_path: PathBuf,

    /// Shared by all nodes.
    pub config_path: PathBuf,
    /// Shared by all nodes.
    pub plugins_path: PathBuf,

    pub index_store_type: String,
    pub master: bool,
    pub data: bool,
    pub http_enabled: bool,
}

impl ClusterConfig {
    /// Creates a configuration for `node_count` nodes with default settings.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            ..Self::default()
        }
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_base_transport_port(mut self, port: u16) -> Self {
        self.base_transport_port = port;
        self
    }

    pub fn with_base_http_port(mut self, port: u16) -> Self {
        self.base_http_port = port;
        self
    }

    pub fn with_index_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.index_store_type = store_type.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Checks that every node index gets a usable, distinct port pair.
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(Error::Config("node count must be >= 1".to_string()));
        }
        if self.cluster_name.trim().is_empty() {
            return Err(Error::Config("cluster name must not be empty".to_string()));
        }
        if self.health_timeout_ms == 0 {
            return Err(Error::Config("health timeout must be > 0".to_string()));
        }

        for (kind, base) in [
            ("transport", self.base_transport_port),
            ("http", self.base_http_port),
        ] {
            let last = usize::from(base) + self.node_count;
            if last > usize::from(u16::MAX) {
                return Err(Error::Config(format!(
                    "{kind} ports {}..={last} exceed {}",
                    usize::from(base) + 1,
                    u16::MAX
                )));
            }
        }

        Ok(())
    }

    /// Computes the resources of node `index` under `base_path`.
    ///
    /// Pure: nothing is created on disk. Distinct indices always yield
    /// distinct ports and directories.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside `1..=node_count`, or if a port would
    /// exceed `u16::MAX`. [`ClusterConfig::validate`] rejects configurations
    /// where the latter can happen.
    pub fn allocate(&self, base_path: &Path, index: usize) -> NodeConfig {
        assert!(
            (1..=self.node_count).contains(&index),
            "node index {index} outside 1..={}",
            self.node_count
        );

        let node_dir = format!("node_{index}");
        let port = |base: u16| {
            u16::try_from(index)
                .ok()
                .and_then(|offset| base.checked_add(offset))
                .expect("port range checked by ClusterConfig::validate")
        };

        NodeConfig {
            index,
            name: format!("Node {index}"),
            cluster_name: self.cluster_name.clone(),
            transport_port: port(self.base_transport_port),
            http_port: port(self.base_http_port),
            data_path: base_path.join(DATA_DIR).join(&node_dir),
            logs_path: base_path.join(LOGS_DIR).join(&node_dir),
            work_path: base_path.join(WORK_DIR).join(&node_dir),
            config_path: base_path.join(CONFIG_DIR),
            plugins_path: base_path.join(PLUGINS_DIR),
            index_store_type: self.index_store_type.clone(),
            master: true,
            data: true,
            http_enabled: true,
        }
    }

    /// Loads a saved configuration from `base_path/config/cluster.toml`.
    pub fn load(base_path: &Path) -> Result<Self> {
        let config_path = base_path.join(CONFIG_DIR).join(CLUSTER_FILE);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "no cluster configuration at {}",
                config_path.display()
            )));
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;

        Ok(config)
    }

    /// Saves the configuration to `base_path/config/cluster.toml`.
    pub fn save(&self, base_path: &Path) -> Result<()> {
        let config_dir = base_path.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(config_dir.join(CLUSTER_FILE), content)?;

        Ok(())
    }
}

impl NodeConfig {
    /// Per-node directories, created before the node starts.
    pub fn directories(&self) -> [&Path; 3] {
        [&self.data_path, &self.logs_path, &self.work_path]
    }

    /// Flat settings view, keyed the way the engine reads them.
    pub fn settings(&self) -> BTreeMap<&'static str, String> {
        let path = |p: &Path| p.display().to_string();

        BTreeMap::from([
            ("cluster.name", self.cluster_name.clone()),
            ("node.name", self.name.clone()),
            ("node.master", self.master.to_string()),
            ("node.data", self.data.to_string()),
            ("http.enabled", self.http_enabled.to_string()),
            ("transport.tcp.port", self.transport_port.to_string()),
            ("http.port", self.http_port.to_string()),
            ("index.store.type", self.index_store_type.clone()),
            ("path.conf", path(&self.config_path)),
            ("path.data", path(&self.data_path)),
            ("path.logs", path(&self.logs_path)),
            ("path.work", path(&self.work_path)),
            ("path.plugins", path(&self.plugins_path)),
        ])
    }
}
