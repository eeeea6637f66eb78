//! Waiting for cluster health.
//!
//! Each wait is a single blocking health request to the coordinator. The
//! engine holds the request until the conditions hold or its own timeout
//! fires; there is no retry loop on this side.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{EngineClient, HealthRequest, HealthResponse, HealthStatus, Priority};
use crate::policy::Escalation;
use crate::Result;

/// Status a cluster can be waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTarget {
    Yellow,
    Green,
}

impl HealthTarget {
    pub fn status(self) -> HealthStatus {
        match self {
            Self::Yellow => HealthStatus::Yellow,
            Self::Green => HealthStatus::Green,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Yellow => "ensure_yellow",
            Self::Green => "ensure_green",
        }
    }
}

/// Cluster state captured when a wait times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Pretty-printed cluster state.
    pub cluster_state: String,
    /// Pretty-printed pending cluster tasks.
    pub pending_tasks: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.cluster_state, self.pending_tasks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub timed_out: bool,
    pub relocating_shards: u32,
    /// Present only when the wait timed out.
    pub diagnostic: Option<Diagnostic>,
}

/// Issues health waits against one coordinator client.
pub struct HealthWaiter<'a> {
    client: &'a dyn EngineClient,
    escalation: Escalation,
    timeout: Duration,
}

impl<'a> HealthWaiter<'a> {
    pub fn new(client: &'a dyn EngineClient, escalation: Escalation, timeout: Duration) -> Self {
        Self {
            client,
            escalation,
            timeout,
        }
    }

    /// Waits until `indices` (or the whole cluster when empty) reach
    /// `target`, no shard is relocating, and languid events have drained.
    pub fn wait_for_status(&self, indices: &[&str], target: HealthTarget) -> Result<HealthResult> {
        let request = HealthRequest::new(self.timeout)
            .indices(indices.iter().copied())
            .wait_for_status(target.status())
            .wait_for_relocating_shards(0)
            .wait_for_events(Priority::Languid);

        self.wait(target.operation(), &request)
    }

    /// Waits until no shard is relocating.
    pub fn wait_for_no_relocation(&self) -> Result<HealthResult> {
        let request = HealthRequest::new(self.timeout).wait_for_relocating_shards(0);
        self.wait("wait_for_relocation", &request)
    }

    fn wait(&self, operation: &str, request: &HealthRequest) -> Result<HealthResult> {
        debug!(operation, ?request, "waiting for cluster health");
        let response = self.client.health(request)?;

        if !response.timed_out {
            return Ok(response.into());
        }

        let diagnostic = self.diagnostic()?;
        let message = format!("{operation} timed out, cluster state:\n{diagnostic}");
        let result = HealthResult {
            status: response.status,
            timed_out: true,
            relocating_shards: response.relocating_shards,
            diagnostic: Some(diagnostic.clone()),
        };

        self.escalation
            .health_timed_out(message, response, diagnostic)?;
        Ok(result)
    }

    fn diagnostic(&self) -> Result<Diagnostic> {
        let state = self.client.cluster_state()?;
        let tasks = self.client.pending_tasks()?;

        Ok(Diagnostic {
            cluster_state: pretty(&state),
            pending_tasks: pretty(&tasks),
        })
    }
}

impl From<HealthResponse> for HealthResult {
    fn from(response: HealthResponse) -> Self {
        Self {
            status: response.status,
            timed_out: response.timed_out,
            relocating_shards: response.relocating_shards,
            diagnostic: None,
        }
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}
