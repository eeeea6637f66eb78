//! The ordered set of nodes started by one runner.

use std::fs;

use tracing::{info, warn};

use crate::engine::{EngineError, EngineLauncher};
use crate::{Error, NodeConfig, NodeHandle, Result};

/// Outcome of closing every node.
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Indices of nodes closed by this call.
    pub closed: Vec<usize>,
    /// Indices of nodes that were already closed.
    pub already_closed: Vec<usize>,
    /// Nodes whose close failed.
    pub failures: Vec<(usize, EngineError)>,
}

impl CloseReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Nodes in start order. Position 0 is the coordinator.
///
/// Nodes are only ever appended. Closing changes per-node state, never the
/// sequence, so [`Fleet::close_all`] and [`Fleet::is_all_closed`] can run
/// from different threads once the fleet is built.
pub struct Fleet {
    launcher: Box<dyn EngineLauncher>,
    nodes: Vec<NodeHandle>,
}

impl Fleet {
    pub fn new(launcher: Box<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            nodes: Vec::new(),
        }
    }

    /// Creates the node's directories, starts it, and appends it.
    ///
    /// On failure the fleet keeps the nodes started so far.
    pub fn start_node(&mut self, config: NodeConfig) -> Result<&NodeHandle> {
        let index = config.index;

        if self.nodes.iter().any(|node| node.index() == index) {
            return Err(Error::NodeAlreadyStarted(index));
        }

        for dir in config.directories() {
            fs::create_dir_all(dir).map_err(|e| Error::StartupFailed {
                index,
                reason: format!("failed to create {}: {e}", dir.display()),
            })?;
        }

        let engine = self
            .launcher
            .launch(&config)
            .map_err(|e| Error::StartupFailed {
                index,
                reason: e.to_string(),
            })?;

        info!(
            node = %config.name,
            transport_port = config.transport_port,
            http_port = config.http_port,
            "node started"
        );

        self.nodes.push(NodeHandle::new(config, engine));
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// True when every node is closed. An empty fleet is closed.
    pub fn is_all_closed(&self) -> bool {
        self.nodes.iter().all(NodeHandle::is_closed)
    }

    /// Closes every node in start order.
    ///
    /// A failure on one node does not stop the others from being closed.
    pub fn close_all(&self) -> CloseReport {
        let mut report = CloseReport::default();

        for node in &self.nodes {
            match node.close() {
                Ok(true) => {
                    info!(node = %node.name(), "node closed");
                    report.closed.push(node.index());
                }
                Ok(false) => report.already_closed.push(node.index()),
                Err(e) => {
                    warn!(node = %node.name(), error = %e, "failed to close node");
                    report.failures.push((node.index(), e));
                }
            }
        }

        report
    }

    /// Node at `position` in start order.
    pub fn get(&self, position: usize) -> Result<&NodeHandle> {
        self.nodes.get(position).ok_or(Error::IndexOutOfRange {
            index: position,
            size: self.nodes.len(),
        })
    }

    pub fn coordinator(&self) -> Result<&NodeHandle> {
        self.get(0)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeHandle> {
        self.nodes.iter()
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        let report = self.close_all();
        if !report.closed.is_empty() {
            warn!(nodes = ?report.closed, "fleet dropped with running nodes, closed them");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterConfig;
    use crate::engine::{EngineClient, EngineNode, EngineResult, MemoryEngine};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn configs(base: &Path, count: usize) -> Vec<NodeConfig> {
        let cluster = ClusterConfig::new(count);
        (1..=count).map(|i| cluster.allocate(base, i)).collect()
    }

    /// Wraps memory nodes; the node with `failing_index` refuses to close.
    struct Flaky {
        inner: MemoryEngine,
        failing_index: usize,
        close_attempts: Arc<AtomicUsize>,
    }

    struct FlakyNode {
        inner: Box<dyn EngineNode>,
        fail: bool,
        close_attempts: Arc<AtomicUsize>,
        closed: AtomicBool,
    }

    impl EngineLauncher for Flaky {
        fn launch(&self, config: &NodeConfig) -> EngineResult<Box<dyn EngineNode>> {
            Ok(Box::new(FlakyNode {
                inner: self.inner.launch(config)?,
                fail: config.index == self.failing_index,
                close_attempts: Arc::clone(&self.close_attempts),
                closed: AtomicBool::new(false),
            }))
        }
    }

    impl EngineNode for FlakyNode {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn client(&self) -> &dyn EngineClient {
            self.inner.client()
        }

        fn close(&self) -> EngineResult<()> {
            self.close_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Launch("stuck".to_string()));
            }
            self.closed.store(true, Ordering::SeqCst);
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_start_nodes_in_order() {
        let temp = TempDir::new().unwrap();
        let mut fleet = Fleet::new(Box::new(MemoryEngine::new()));

        for (i, config) in configs(temp.path(), 3).into_iter().enumerate() {
            let node = fleet.start_node(config).unwrap();
            assert_eq!(node.index(), i + 1);
            assert!(!fleet.get(i).unwrap().is_closed());
        }

        assert_eq!(fleet.size(), 3);
        assert_eq!(fleet.coordinator().unwrap().name(), "Node 1");
        assert!(!fleet.is_all_closed());

        for i in 1..=3 {
            assert!(temp.path().join("data").join(format!("node_{i}")).is_dir());
            assert!(temp.path().join("logs").join(format!("node_{i}")).is_dir());
            assert!(temp.path().join("work").join(format!("node_{i}")).is_dir());
        }
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let temp = TempDir::new().unwrap();
        let mut fleet = Fleet::new(Box::new(MemoryEngine::new()));
        let config = configs(temp.path(), 1).remove(0);

        fleet.start_node(config.clone()).unwrap();
        let result = fleet.start_node(config);

        assert!(matches!(result, Err(Error::NodeAlreadyStarted(1))));
        assert_eq!(fleet.size(), 1);
    }

    #[test]
    fn test_startup_failure_keeps_partial_fleet() {
        let temp = TempDir::new().unwrap();
        let mut fleet = Fleet::new(Box::new(MemoryEngine::new()));
        let mut configs = configs(temp.path(), 2);
        configs[1].transport_port = configs[0].http_port;

        fleet.start_node(configs[0].clone()).unwrap();
        let result = fleet.start_node(configs[1].clone());

        assert!(matches!(result, Err(Error::StartupFailed { index: 2, .. })));
        assert_eq!(fleet.size(), 1);
        assert!(!fleet.get(0).unwrap().is_closed());
    }

    #[test]
    fn test_directory_failure_is_startup_failure() {
        let temp = TempDir::new().unwrap();
        // A file where the data directory tree should go.
        std::fs::write(temp.path().join("data"), "blocker").unwrap();
        let mut fleet = Fleet::new(Box::new(MemoryEngine::new()));

        let result = fleet.start_node(configs(temp.path(), 1).remove(0));

        assert!(matches!(result, Err(Error::StartupFailed { index: 1, .. })));
        assert_eq!(fleet.size(), 0);
    }

    #[test]
    fn test_get_out_of_range() {
        let fleet = Fleet::new(Box::new(MemoryEngine::new()));

        assert!(matches!(
            fleet.get(0),
            Err(Error::IndexOutOfRange { index: 0, size: 0 })
        ));
        assert!(fleet.coordinator().is_err());
    }

    #[test]
    fn test_empty_fleet_is_closed() {
        let fleet = Fleet::new(Box::new(MemoryEngine::new()));
        assert!(fleet.is_all_closed());

        let report = fleet.close_all();
        assert!(report.is_success());
        assert!(report.closed.is_empty());
    }

    #[test]
    fn test_close_all_twice() {
        let temp = TempDir::new().unwrap();
        let mut fleet = Fleet::new(Box::new(MemoryEngine::new()));
        for config in configs(temp.path(), 3) {
            fleet.start_node(config).unwrap();
        }

        let first = fleet.close_all();
        assert_eq!(first.closed, vec![1, 2, 3]);
        assert!(fleet.is_all_closed());

        let second = fleet.close_all();
        assert!(second.is_success());
        assert!(second.closed.is_empty());
        assert_eq!(second.already_closed, vec![1, 2, 3]);
        assert!(fleet.is_all_closed());
    }

    #[test]
    fn test_close_failure_does_not_stop_others() {
        let temp = TempDir::new().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut fleet = Fleet::new(Box::new(Flaky {
            inner: MemoryEngine::new(),
            failing_index: 1,
            close_attempts: Arc::clone(&attempts),
        }));
        for config in configs(temp.path(), 3) {
            fleet.start_node(config).unwrap();
        }

        let report = fleet.close_all();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.closed, vec![2, 3]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
        assert!(!fleet.is_all_closed());
    }
}
