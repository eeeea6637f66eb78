//! Handles to started nodes.

use crate::NodeConfig;
use crate::engine::{EngineClient, EngineNode, EngineResult};

/// Status of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node is serving.
    Running,

    /// Node has been closed. Closed nodes are never restarted.
    Closed,
}

/// A started engine instance together with the resources it was given.
pub struct NodeHandle {
    config: NodeConfig,
    engine: Box<dyn EngineNode>,
}

impl NodeHandle {
    pub(crate) fn new(config: NodeConfig, engine: Box<dyn EngineNode>) -> Self {
        Self { config, engine }
    }

    /// Node index (1-based).
    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn transport_port(&self) -> u16 {
        self.config.transport_port
    }

    pub fn http_port(&self) -> u16 {
        self.config.http_port
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn client(&self) -> &dyn EngineClient {
        self.engine.client()
    }

    pub fn status(&self) -> NodeStatus {
        if self.is_closed() {
            NodeStatus::Closed
        } else {
            NodeStatus::Running
        }
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// Closes the node. Returns `false` if it was already closed.
    pub fn close(&self) -> EngineResult<bool> {
        if self.engine.is_closed() {
            return Ok(false);
        }
        self.engine.close()?;
        Ok(true)
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("index", &self.config.index)
            .field("name", &self.config.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterConfig;
    use crate::engine::{EngineLauncher, MemoryEngine};
    use tempfile::TempDir;

    fn started_node(temp: &TempDir) -> NodeHandle {
        let config = ClusterConfig::new(1).allocate(temp.path(), 1);
        for dir in config.directories() {
            std::fs::create_dir_all(dir).unwrap();
        }
        let engine = MemoryEngine::new().launch(&config).unwrap();
        NodeHandle::new(config, engine)
    }

    #[test]
    fn test_node_handle_accessors() {
        let temp = TempDir::new().unwrap();
        let node = started_node(&temp);

        assert_eq!(node.index(), 1);
        assert_eq!(node.name(), "Node 1");
        assert_eq!(node.transport_port(), 9301);
        assert_eq!(node.http_port(), 9201);
        assert_eq!(node.status(), NodeStatus::Running);
        assert!(!node.is_closed());
    }

    #[test]
    fn test_node_close_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let node = started_node(&temp);

        assert!(node.close().unwrap());
        assert_eq!(node.status(), NodeStatus::Closed);

        assert!(!node.close().unwrap());
        assert!(node.is_closed());
    }
}
