//! Index and document operations against the coordinator.
//!
//! Each call checks the response for the failure signal of its kind and
//! hands failures to the runner's [`Escalation`](crate::policy::Escalation).
//! Under fail-soft the unsuccessful response is returned as is.

use crate::engine::{
    BroadcastResponse, CreateIndexResponse, DeleteRequest, DeleteResponse, EngineResponse,
    IndexRequest, IndexResponse, IndexSettings, Query, SearchRequest, SearchResponse, Sort,
};
use crate::{ClusterRunner, Result};

impl ClusterRunner {
    /// Creates `index`; engine defaults apply when `settings` is `None`.
    pub fn create_index(
        &self,
        index: &str,
        settings: Option<IndexSettings>,
    ) -> Result<CreateIndexResponse> {
        let response = self
            .client()?
            .create_index(index, &settings.unwrap_or_default())?;

        if !response.acknowledged {
            self.escalation().operation_failed(
                format!("Failed to create {index}."),
                EngineResponse::CreateIndex(response.clone()),
            )?;
        }
        Ok(response)
    }

    pub fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.client()?.index_exists(index)?)
    }

    /// Indexes a JSON document and makes it searchable before returning.
    ///
    /// Overwriting an existing id counts as a failure.
    pub fn insert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &str,
    ) -> Result<IndexResponse> {
        let response = self.client()?.index(IndexRequest {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            source: source.to_string(),
            refresh: true,
        })?;

        if !response.created {
            self.escalation().operation_failed(
                format!("Failed to insert {id} into {index}/{doc_type}."),
                EngineResponse::Index(response.clone()),
            )?;
        }
        Ok(response)
    }

    /// Deletes a document and makes the deletion visible before returning.
    ///
    /// A missing document counts as a failure.
    pub fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<DeleteResponse> {
        let response = self.client()?.delete(DeleteRequest {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            refresh: true,
        })?;

        if !response.found {
            self.escalation().operation_failed(
                format!("Failed to delete {id} from {index}/{doc_type}."),
                EngineResponse::Delete(response.clone()),
            )?;
        }
        Ok(response)
    }

    /// Searches `index`/`doc_type`. Defaults to match-all ordered by score.
    pub fn search(
        &self,
        index: &str,
        doc_type: &str,
        query: Option<Query>,
        sort: Option<Sort>,
        from: usize,
        size: usize,
    ) -> Result<SearchResponse> {
        Ok(self.client()?.search(SearchRequest {
            index: index.to_string(),
            doc_type: Some(doc_type.to_string()),
            query: query.unwrap_or_default(),
            sort: sort.unwrap_or_default(),
            from,
            size,
        })?)
    }

    pub fn flush(&self) -> Result<BroadcastResponse> {
        self.wait_for_relocation()?;
        let response = self.client()?.flush()?;
        self.check_shard_failures("flush", response, EngineResponse::Flush)
    }

    pub fn refresh(&self) -> Result<BroadcastResponse> {
        self.wait_for_relocation()?;
        let response = self.client()?.refresh()?;
        self.check_shard_failures("refresh", response, EngineResponse::Refresh)
    }

    pub fn optimize(&self, force: bool) -> Result<BroadcastResponse> {
        self.wait_for_relocation()?;
        let response = self.client()?.optimize(force)?;
        self.check_shard_failures("optimize", response, EngineResponse::Optimize)
    }

    fn check_shard_failures(
        &self,
        operation: &str,
        response: BroadcastResponse,
        wrap: fn(BroadcastResponse) -> EngineResponse,
    ) -> Result<BroadcastResponse> {
        if !response.shard_failures.is_empty() {
            let failures: Vec<String> = response
                .shard_failures
                .iter()
                .map(ToString::to_string)
                .collect();
            self.escalation().operation_failed(
                format!(
                    "Failed to {operation} {} of {} shards: {}",
                    response.failed_shards,
                    response.total_shards,
                    failures.join(", ")
                ),
                wrap(response.clone()),
            )?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        EngineClient, EngineError, EngineLauncher, EngineNode, EngineResult, HealthRequest,
        HealthResponse, HealthStatus, PendingTask,
    };
    use crate::{ClusterConfig, Error, FailurePolicy, NodeConfig, OutputSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Coordinator that logs every call in order. Health requests report
    /// `relocation_timed_out` as their timeout flag.
    struct RecordingCoordinator {
        relocation_timed_out: bool,
        calls: Mutex<Vec<&'static str>>,
        health_requests: Mutex<Vec<HealthRequest>>,
    }

    impl RecordingCoordinator {
        fn new(relocation_timed_out: bool) -> Arc<Self> {
            Arc::new(Self {
                relocation_timed_out,
                calls: Mutex::new(Vec::new()),
                health_requests: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl EngineClient for RecordingCoordinator {
        fn health(&self, request: &HealthRequest) -> EngineResult<HealthResponse> {
            self.record("health");
            self.health_requests.lock().unwrap().push(request.clone());
            Ok(HealthResponse {
                cluster_name: "test".to_string(),
                status: HealthStatus::Green,
                timed_out: self.relocation_timed_out,
                number_of_nodes: 1,
                active_shards: 5,
                relocating_shards: u32::from(self.relocation_timed_out),
                unassigned_shards: 0,
            })
        }

        fn cluster_state(&self) -> EngineResult<serde_json::Value> {
            self.record("cluster_state");
            Ok(serde_json::json!({ "cluster_name": "test" }))
        }

        fn pending_tasks(&self) -> EngineResult<Vec<PendingTask>> {
            self.record("pending_tasks");
            Ok(Vec::new())
        }

        fn create_index(&self, index: &str, _: &IndexSettings) -> EngineResult<CreateIndexResponse> {
            Err(EngineError::IndexNotFound(index.to_string()))
        }

        fn index_exists(&self, _: &str) -> EngineResult<bool> {
            Ok(false)
        }

        fn index(&self, request: IndexRequest) -> EngineResult<IndexResponse> {
            Err(EngineError::IndexNotFound(request.index))
        }

        fn delete(&self, request: DeleteRequest) -> EngineResult<DeleteResponse> {
            Err(EngineError::IndexNotFound(request.index))
        }

        fn search(&self, request: SearchRequest) -> EngineResult<SearchResponse> {
            Err(EngineError::IndexNotFound(request.index))
        }

        fn flush(&self) -> EngineResult<BroadcastResponse> {
            self.record("flush");
            Ok(BroadcastResponse::default())
        }

        fn refresh(&self) -> EngineResult<BroadcastResponse> {
            self.record("refresh");
            Ok(BroadcastResponse::default())
        }

        fn optimize(&self, _: bool) -> EngineResult<BroadcastResponse> {
            self.record("optimize");
            Ok(BroadcastResponse::default())
        }
    }

    struct RecordingNode {
        name: String,
        coordinator: Arc<RecordingCoordinator>,
        closed: AtomicBool,
    }

    impl EngineNode for RecordingNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn client(&self) -> &dyn EngineClient {
            self.coordinator.as_ref()
        }

        fn close(&self) -> EngineResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct RecordingLauncher(Arc<RecordingCoordinator>);

    impl EngineLauncher for RecordingLauncher {
        fn launch(&self, config: &NodeConfig) -> EngineResult<Box<dyn EngineNode>> {
            Ok(Box::new(RecordingNode {
                name: config.name.clone(),
                coordinator: Arc::clone(&self.0),
                closed: AtomicBool::new(false),
            }))
        }
    }

    fn runner(
        temp: &TempDir,
        coordinator: &Arc<RecordingCoordinator>,
        policy: FailurePolicy,
    ) -> ClusterRunner {
        ClusterRunner::build(
            ClusterConfig::new(1)
                .with_base_path(temp.path())
                .with_failure_policy(policy)
                .with_output(OutputSink::Log),
            RecordingLauncher(Arc::clone(coordinator)),
        )
        .unwrap()
    }

    #[test]
    fn test_maintenance_waits_for_relocation_first() {
        let temp = TempDir::new().unwrap();
        let coordinator = RecordingCoordinator::new(false);
        let runner = runner(&temp, &coordinator, FailurePolicy::FailFast);

        runner.flush().unwrap();
        runner.refresh().unwrap();
        runner.optimize(true).unwrap();

        assert_eq!(
            coordinator.calls(),
            vec!["health", "flush", "health", "refresh", "health", "optimize"]
        );
        for request in coordinator.health_requests.lock().unwrap().iter() {
            assert_eq!(request.wait_for_relocating_shards, Some(0));
            assert_eq!(request.wait_for_status, None);
        }
    }

    #[test]
    fn test_relocation_timeout_fails_fast_before_flush() {
        let temp = TempDir::new().unwrap();
        let coordinator = RecordingCoordinator::new(true);
        let runner = runner(&temp, &coordinator, FailurePolicy::FailFast);

        let err = runner.flush().unwrap_err();

        match err {
            Error::HealthTimeout { message, response, .. } => {
                assert!(message.starts_with("wait_for_relocation timed out"));
                assert_eq!(response.relocating_shards, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!coordinator.calls().contains(&"flush"));
    }

    #[test]
    fn test_relocation_timeout_fail_soft_still_flushes() {
        let temp = TempDir::new().unwrap();
        let coordinator = RecordingCoordinator::new(true);
        let runner = runner(&temp, &coordinator, FailurePolicy::FailSoft);

        runner.flush().unwrap();

        let calls = coordinator.calls();
        assert_eq!(calls.first(), Some(&"health"));
        assert_eq!(calls.last(), Some(&"flush"));
    }
}
