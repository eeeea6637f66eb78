//! Black-box interface to the data engine.
//!
//! The runner never reaches into engine internals. It launches nodes through
//! an [`EngineLauncher`], tracks them through [`EngineNode`], and issues every
//! admin and data call through the node's [`EngineClient`]. All calls are
//! synchronous: they return once the engine has answered.

pub mod memory;
mod types;

pub use memory::{MemoryCluster, MemoryEngine};
pub use types::{
    BroadcastResponse, CreateIndexResponse, DeleteRequest, DeleteResponse, EngineResponse,
    HealthRequest, HealthResponse, HealthStatus, IndexRequest, IndexResponse, IndexSettings,
    PendingTask, Priority, Query, SearchHit, SearchRequest, SearchResponse, ShardFailure, Sort,
    SortOrder,
};

use crate::NodeConfig;
use thiserror::Error;

/// Errors returned by an engine when it cannot produce a response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The node has been closed.
    #[error("node {0} is closed")]
    NodeClosed(String),

    /// A port is already bound by another node.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// The node could not be launched.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Index already exists.
    #[error("index [{0}] already exists")]
    IndexAlreadyExists(String),

    /// Index does not exist.
    #[error("index [{0}] not found")]
    IndexNotFound(String),

    /// Document source could not be parsed.
    #[error("failed to parse document source: {0}")]
    MapperParsing(String),
}

/// Result type for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Starts engine instances.
pub trait EngineLauncher: Send + Sync {
    /// Starts a node with the given settings and blocks until it is ready.
    fn launch(&self, config: &NodeConfig) -> EngineResult<Box<dyn EngineNode>>;
}

/// A started engine instance.
pub trait EngineNode: Send + Sync {
    /// Node name as reported to the cluster.
    fn name(&self) -> &str;

    /// Client bound to this node.
    fn client(&self) -> &dyn EngineClient;

    /// Closes the node. Closing an already-closed node is a no-op.
    fn close(&self) -> EngineResult<()>;

    /// Whether the node has been closed.
    fn is_closed(&self) -> bool;
}

/// Client capability exposed by a node.
pub trait EngineClient: Send + Sync {
    /// Blocks until the request's wait conditions hold or its timeout elapses.
    fn health(&self, request: &HealthRequest) -> EngineResult<HealthResponse>;

    /// Current cluster state as a JSON document.
    fn cluster_state(&self) -> EngineResult<serde_json::Value>;

    /// Cluster tasks queued on the master.
    fn pending_tasks(&self) -> EngineResult<Vec<PendingTask>>;

    fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> EngineResult<CreateIndexResponse>;

    fn index_exists(&self, index: &str) -> EngineResult<bool>;

    fn index(&self, request: IndexRequest) -> EngineResult<IndexResponse>;

    fn delete(&self, request: DeleteRequest) -> EngineResult<DeleteResponse>;

    fn search(&self, request: SearchRequest) -> EngineResult<SearchResponse>;

    fn flush(&self) -> EngineResult<BroadcastResponse>;

    fn refresh(&self) -> EngineResult<BroadcastResponse>;

    fn optimize(&self, force: bool) -> EngineResult<BroadcastResponse>;
}
