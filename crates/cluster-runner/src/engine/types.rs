//! Requests and responses exchanged with the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cluster health, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// At least one primary shard is unassigned.
    Red,
    /// All primaries assigned, some replicas are not.
    Yellow,
    /// Every shard is assigned.
    Green,
}

impl HealthStatus {
    /// Whether this status is at least as good as `target`.
    pub fn satisfies(self, target: HealthStatus) -> bool {
        self >= target
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "RED"),
            Self::Yellow => write!(f, "YELLOW"),
            Self::Green => write!(f, "GREEN"),
        }
    }
}

/// Priority of cluster events. A health request waiting for events of a
/// given priority returns only after everything queued at that priority or
/// higher has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Immediate,
    Urgent,
    High,
    Normal,
    Low,
    Languid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRequest {
    /// Indices to scope the check to. Empty means the whole cluster.
    pub indices: Vec<String>,
    pub wait_for_status: Option<HealthStatus>,
    pub wait_for_relocating_shards: Option<u32>,
    pub wait_for_events: Option<Priority>,
    /// Engine-side deadline for the wait.
    pub timeout: Duration,
}

impl HealthRequest {
    pub fn new(timeout: Duration) -> Self {
        Self {
            indices: Vec::new(),
            wait_for_status: None,
            wait_for_relocating_shards: None,
            wait_for_events: None,
            timeout,
        }
    }

    pub fn indices<I, S>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices = indices.into_iter().map(Into::into).collect();
        self
    }

    pub fn wait_for_status(mut self, status: HealthStatus) -> Self {
        self.wait_for_status = Some(status);
        self
    }

    pub fn wait_for_relocating_shards(mut self, count: u32) -> Self {
        self.wait_for_relocating_shards = Some(count);
        self
    }

    pub fn wait_for_events(mut self, priority: Priority) -> Self {
        self.wait_for_events = Some(priority);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub cluster_name: String,
    pub status: HealthStatus,
    pub timed_out: bool,
    pub number_of_nodes: usize,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub unassigned_shards: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub insert_order: u64,
    pub priority: Priority,
    pub source: String,
    pub time_in_queue_millis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 5,
            number_of_replicas: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexResponse {
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    /// JSON document source.
    pub source: String,
    /// Make the change searchable before returning.
    pub refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub version: u64,
    /// False when an existing document was overwritten.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub version: u64,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Query {
    #[default]
    MatchAll,
    /// Exact match on a top-level source field.
    Term {
        field: String,
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sort {
    /// Descending relevance score.
    #[default]
    Score,
    Field { field: String, order: SortOrder },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub doc_type: Option<String>,
    pub query: Query,
    pub sort: Sort,
    pub from: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub score: f32,
    pub source: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total_hits: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFailure {
    pub index: String,
    pub shard: u32,
    pub reason: String,
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}] {}", self.index, self.shard, self.reason)
    }
}

/// Response of a call broadcast to every shard (flush, refresh, optimize).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub total_shards: u32,
    pub successful_shards: u32,
    pub failed_shards: u32,
    pub shard_failures: Vec<ShardFailure>,
}

/// Any response the runner may attach to a reported failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "response", rename_all = "snake_case")]
pub enum EngineResponse {
    CreateIndex(CreateIndexResponse),
    Index(IndexResponse),
    Delete(DeleteResponse),
    Flush(BroadcastResponse),
    Refresh(BroadcastResponse),
    Optimize(BroadcastResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(HealthStatus::Green, HealthStatus::Green => true; "green meets green")]
    #[test_case(HealthStatus::Green, HealthStatus::Yellow => true; "green meets yellow")]
    #[test_case(HealthStatus::Yellow, HealthStatus::Yellow => true; "yellow meets yellow")]
    #[test_case(HealthStatus::Yellow, HealthStatus::Green => false; "yellow misses green")]
    #[test_case(HealthStatus::Red, HealthStatus::Yellow => false; "red misses yellow")]
    fn test_status_satisfies(status: HealthStatus, target: HealthStatus) -> bool {
        status.satisfies(target)
    }

    #[test]
    fn test_health_request_builder() {
        let request = HealthRequest::new(Duration::from_secs(30))
            .indices(["a", "b"])
            .wait_for_status(HealthStatus::Green)
            .wait_for_relocating_shards(0)
            .wait_for_events(Priority::Languid);

        assert_eq!(request.indices, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(request.wait_for_status, Some(HealthStatus::Green));
        assert_eq!(request.wait_for_relocating_shards, Some(0));
        assert_eq!(request.wait_for_events, Some(Priority::Languid));
    }

    #[test]
    fn test_shard_failure_display() {
        let failure = ShardFailure {
            index: "i1".to_string(),
            shard: 3,
            reason: "disk full".to_string(),
        };
        assert_eq!(failure.to_string(), "[i1][3] disk full");
    }
}
