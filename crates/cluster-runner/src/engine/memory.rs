//! In-process engine backed by shared memory.
//!
//! Every node launched through one [`MemoryEngine`] joins the same
//! [`MemoryCluster`]. Documents are kept as JSON per index, type and id and
//! are visible to search as soon as a write returns. Shard placement is
//! modelled just far enough to give health checks meaning: an index is
//! green when there are more live nodes than it has replicas, yellow
//! otherwise, and the cluster is red with no live node or a missing index.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tracing::debug;

use super::{
    BroadcastResponse, CreateIndexResponse, DeleteRequest, DeleteResponse, EngineClient,
    EngineError, EngineLauncher, EngineNode, EngineResult, HealthRequest, HealthResponse,
    HealthStatus, IndexRequest, IndexResponse, IndexSettings, PendingTask, Query, SearchHit,
    SearchRequest, SearchResponse, ShardFailure, Sort, SortOrder,
};
use crate::NodeConfig;

/// Launcher for in-process nodes sharing one [`MemoryCluster`].
#[derive(Default)]
pub struct MemoryEngine {
    cluster: Arc<MemoryCluster>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared cluster state, for inspection and fault injection.
    pub fn cluster(&self) -> Arc<MemoryCluster> {
        Arc::clone(&self.cluster)
    }
}

impl EngineLauncher for MemoryEngine {
    fn launch(&self, config: &NodeConfig) -> EngineResult<Box<dyn EngineNode>> {
        for dir in config.directories() {
            if !dir.is_dir() {
                return Err(EngineError::Launch(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
        }

        let mut data = self.cluster.lock();

        match &data.name {
            Some(name) if *name != config.cluster_name => {
                return Err(EngineError::Launch(format!(
                    "node {} belongs to cluster {}, not {}",
                    config.name, config.cluster_name, name
                )));
            }
            Some(_) => {}
            None => data.name = Some(config.cluster_name.clone()),
        }

        if data.nodes.contains_key(&config.name) {
            return Err(EngineError::Launch(format!(
                "node name {} is already taken",
                config.name
            )));
        }

        for port in [config.transport_port, config.http_port] {
            if data
                .nodes
                .values()
                .any(|node| node.transport_port == port || node.http_port == port)
            {
                return Err(EngineError::PortInUse(port));
            }
        }

        data.nodes.insert(
            config.name.clone(),
            LiveNode {
                transport_port: config.transport_port,
                http_port: config.http_port,
            },
        );
        drop(data);
        self.cluster.notify();

        debug!(node = %config.name, "memory node joined cluster");

        Ok(Box::new(MemoryNode {
            name: config.name.clone(),
            cluster: Arc::clone(&self.cluster),
            closed: AtomicBool::new(false),
        }))
    }
}

/// State shared by all nodes of one in-memory cluster.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterData>,
    changed: Condvar,
}

impl MemoryCluster {
    /// Number of nodes currently joined.
    pub fn live_nodes(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Makes every subsequent flush, refresh and optimize report a failure
    /// for the given shard.
    pub fn inject_shard_failure(&self, index: &str, shard: u32, reason: &str) {
        self.lock().faults.shard_failures.push(ShardFailure {
            index: index.to_string(),
            shard,
            reason: reason.to_string(),
        });
    }

    /// Makes index creation report `acknowledged: false`.
    pub fn withhold_acknowledgement(&self, withhold: bool) {
        self.lock().faults.withhold_ack = withhold;
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    fn lock(&self) -> MutexGuard<'_, ClusterData> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, ClusterData>,
        timeout: Duration,
    ) -> MutexGuard<'a, ClusterData> {
        self.changed
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    fn wait_forever<'a>(&self, guard: MutexGuard<'a, ClusterData>) -> MutexGuard<'a, ClusterData> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.notify_all();
    }
}

#[derive(Default)]
struct ClusterData {
    name: Option<String>,
    nodes: BTreeMap<String, LiveNode>,
    indices: BTreeMap<String, IndexData>,
    faults: Faults,
}

struct LiveNode {
    transport_port: u16,
    http_port: u16,
}

struct IndexData {
    settings: IndexSettings,
    /// Keyed by (type, id).
    docs: BTreeMap<(String, String), StoredDoc>,
}

impl IndexData {
    fn new(settings: IndexSettings) -> Self {
        Self {
            settings,
            docs: BTreeMap::new(),
        }
    }

    /// Primary plus replicas.
    fn copies(&self) -> u32 {
        self.settings.number_of_replicas.saturating_add(1)
    }

    fn shard_copies(&self, count: u32) -> u32 {
        self.settings.number_of_shards.saturating_mul(count)
    }
}

struct StoredDoc {
    source: Value,
    version: u64,
}

#[derive(Default)]
struct Faults {
    shard_failures: Vec<ShardFailure>,
    withhold_ack: bool,
}

impl ClusterData {
    fn health(&self, indices: &[String]) -> HealthResponse {
        let live = self.nodes.len() as u32;
        let mut status = if live == 0 {
            HealthStatus::Red
        } else {
            HealthStatus::Green
        };
        let mut active_shards = 0;
        let mut unassigned_shards = 0;

        let selected: Vec<Option<&IndexData>> = if indices.is_empty() {
            self.indices.values().map(Some).collect()
        } else {
            indices.iter().map(|name| self.indices.get(name)).collect()
        };

        for index in selected {
            let Some(index) = index else {
                status = HealthStatus::Red;
                continue;
            };
            let copies = index.copies();
            let assigned = copies.min(live);
            active_shards = index.shard_copies(assigned).saturating_add(active_shards);
            unassigned_shards =
                index.shard_copies(copies - assigned).saturating_add(unassigned_shards);

            let index_status = if assigned == 0 {
                HealthStatus::Red
            } else if assigned < copies {
                HealthStatus::Yellow
            } else {
                HealthStatus::Green
            };
            status = status.min(index_status);
        }

        HealthResponse {
            cluster_name: self.name.clone().unwrap_or_default(),
            status,
            timed_out: false,
            number_of_nodes: self.nodes.len(),
            active_shards,
            relocating_shards: 0,
            unassigned_shards,
        }
    }

    fn state(&self) -> Value {
        let nodes: Map<String, Value> = self
            .nodes
            .iter()
            .map(|(name, node)| {
                (
                    name.clone(),
                    json!({
                        "transport_port": node.transport_port,
                        "http_port": node.http_port,
                    }),
                )
            })
            .collect();

        let indices: Map<String, Value> = self
            .indices
            .iter()
            .map(|(name, index)| {
                (
                    name.clone(),
                    json!({
                        "settings": index.settings,
                        "docs": index.docs.len(),
                    }),
                )
            })
            .collect();

        json!({
            "cluster_name": self.name,
            "nodes": nodes,
            "metadata": { "indices": indices },
        })
    }

    fn broadcast(&self) -> BroadcastResponse {
        let live = self.nodes.len() as u32;
        let total_shards = self
            .indices
            .values()
            .map(|index| index.shard_copies(index.copies().min(live)))
            .fold(0u32, u32::saturating_add);
        let shard_failures = self.faults.shard_failures.clone();
        let failed_shards = shard_failures.len() as u32;

        BroadcastResponse {
            total_shards,
            successful_shards: total_shards.saturating_sub(failed_shards),
            failed_shards,
            shard_failures,
        }
    }
}

fn request_met(request: &HealthRequest, response: &HealthResponse) -> bool {
    request
        .wait_for_status
        .is_none_or(|target| response.status.satisfies(target))
        && request
            .wait_for_relocating_shards
            .is_none_or(|max| response.relocating_shards <= max)
}

fn matches(query: &Query, source: &Value) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Term { field, value } => source.get(field) == Some(value),
    }
}

/// Orders JSON values of the same kind; missing or mixed values sort last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

struct MemoryNode {
    name: String,
    cluster: Arc<MemoryCluster>,
    closed: AtomicBool,
}

impl MemoryNode {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.is_closed() {
            Err(EngineError::NodeClosed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl EngineNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> &dyn EngineClient {
        self
    }

    fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cluster.lock().nodes.remove(&self.name);
        self.cluster.notify();
        debug!(node = %self.name, "memory node left cluster");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryNode {
    fn drop(&mut self) {
        // Close never fails for memory nodes.
        let _ = self.close();
    }
}

impl EngineClient for MemoryNode {
    fn health(&self, request: &HealthRequest) -> EngineResult<HealthResponse> {
        self.ensure_open()?;

        // No representable deadline means waiting until the request is met.
        let deadline = Instant::now().checked_add(request.timeout);
        let mut data = self.cluster.lock();
        loop {
            let mut response = data.health(&request.indices);
            if request_met(request, &response) {
                return Ok(response);
            }

            data = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        response.timed_out = true;
                        return Ok(response);
                    }
                    self.cluster.wait(data, deadline - now)
                }
                None => self.cluster.wait_forever(data),
            };
        }
    }

    fn cluster_state(&self) -> EngineResult<Value> {
        self.ensure_open()?;
        Ok(self.cluster.lock().state())
    }

    fn pending_tasks(&self) -> EngineResult<Vec<PendingTask>> {
        self.ensure_open()?;
        // Cluster state updates are applied synchronously, nothing ever queues.
        Ok(Vec::new())
    }

    fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> EngineResult<CreateIndexResponse> {
        self.ensure_open()?;

        let mut data = self.cluster.lock();
        if data.indices.contains_key(index) {
            return Err(EngineError::IndexAlreadyExists(index.to_string()));
        }
        data.indices
            .insert(index.to_string(), IndexData::new(*settings));
        let acknowledged = !data.faults.withhold_ack;
        drop(data);
        self.cluster.notify();

        Ok(CreateIndexResponse { acknowledged })
    }

    fn index_exists(&self, index: &str) -> EngineResult<bool> {
        self.ensure_open()?;
        Ok(self.cluster.lock().indices.contains_key(index))
    }

    fn index(&self, request: IndexRequest) -> EngineResult<IndexResponse> {
        self.ensure_open()?;

        let source: Value = serde_json::from_str(&request.source)
            .map_err(|e| EngineError::MapperParsing(e.to_string()))?;
        if !source.is_object() {
            return Err(EngineError::MapperParsing(
                "document source must be a JSON object".to_string(),
            ));
        }

        let mut data = self.cluster.lock();
        let auto_created = !data.indices.contains_key(&request.index);
        let index = data
            .indices
            .entry(request.index.clone())
            .or_insert_with(|| IndexData::new(IndexSettings::default()));

        let key = (request.doc_type.clone(), request.id.clone());
        let previous = index.docs.get(&key).map(|doc| doc.version);
        let version = previous.map_or(1, |v| v + 1);
        index.docs.insert(key, StoredDoc { source, version });
        drop(data);

        if auto_created {
            self.cluster.notify();
        }

        Ok(IndexResponse {
            index: request.index,
            doc_type: request.doc_type,
            id: request.id,
            version,
            created: previous.is_none(),
        })
    }

    fn delete(&self, request: DeleteRequest) -> EngineResult<DeleteResponse> {
        self.ensure_open()?;

        let mut data = self.cluster.lock();
        let removed = data.indices.get_mut(&request.index).and_then(|index| {
            index
                .docs
                .remove(&(request.doc_type.clone(), request.id.clone()))
        });

        Ok(DeleteResponse {
            index: request.index,
            doc_type: request.doc_type,
            id: request.id,
            version: removed.as_ref().map_or(1, |doc| doc.version + 1),
            found: removed.is_some(),
        })
    }

    fn search(&self, request: SearchRequest) -> EngineResult<SearchResponse> {
        self.ensure_open()?;

        let data = self.cluster.lock();
        let index = data
            .indices
            .get(&request.index)
            .ok_or_else(|| EngineError::IndexNotFound(request.index.clone()))?;

        let mut hits: Vec<SearchHit> = index
            .docs
            .iter()
            .filter(|((doc_type, _), _)| {
                request.doc_type.as_ref().is_none_or(|t| t == doc_type)
            })
            .filter(|(_, doc)| matches(&request.query, &doc.source))
            .map(|((doc_type, id), doc)| SearchHit {
                index: request.index.clone(),
                doc_type: doc_type.clone(),
                id: id.clone(),
                score: 1.0,
                source: doc.source.clone(),
            })
            .collect();
        drop(data);

        match &request.sort {
            Sort::Score => hits.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(CmpOrdering::Equal)
            }),
            Sort::Field { field, order } => hits.sort_by(|a, b| {
                let ordering = compare_values(a.source.get(field), b.source.get(field));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }),
        }

        let total_hits = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .collect();

        Ok(SearchResponse { total_hits, hits })
    }

    fn flush(&self) -> EngineResult<BroadcastResponse> {
        self.ensure_open()?;
        Ok(self.cluster.lock().broadcast())
    }

    fn refresh(&self) -> EngineResult<BroadcastResponse> {
        self.ensure_open()?;
        Ok(self.cluster.lock().broadcast())
    }

    fn optimize(&self, force: bool) -> EngineResult<BroadcastResponse> {
        self.ensure_open()?;
        debug!(node = %self.name, force, "optimize");
        Ok(self.cluster.lock().broadcast())
    }
}
