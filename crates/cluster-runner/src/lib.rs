//! In-process multi-node cluster runner.
//!
//! Provides local cluster orchestration for development and integration
//! testing:
//! - Disjoint ports and directories for every node
//! - Ordered start-up and best-effort shutdown of a fixed-size fleet
//! - Blocking health waits against a single coordinator node
//! - Index and document operations with one fail-fast / fail-soft policy
//! - Verified teardown of everything under the base path
//!
//! ```no_run
//! use cluster_runner::{ClusterConfig, ClusterRunner, MemoryEngine};
//!
//! # fn main() -> cluster_runner::Result<()> {
//! let runner = ClusterRunner::build(ClusterConfig::new(3), MemoryEngine::new())?;
//! runner.ensure_yellow(&[])?;
//! runner.insert("i1", "t", "1", r#"{"a":1}"#)?;
//! runner.close();
//! runner.clean()?;
//! # Ok(())
//! # }
//! ```

pub mod clean;
pub mod config;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod health;
pub mod node;
mod ops;
pub mod policy;
pub mod runner;

pub use clean::{CleanReport, delete_tree};
pub use config::{ClusterConfig, NodeConfig};
pub use engine::{EngineClient, EngineLauncher, EngineNode, MemoryEngine};
pub use error::{Error, Result};
pub use fleet::{CloseReport, Fleet};
pub use health::{Diagnostic, HealthResult, HealthTarget};
pub use node::{NodeHandle, NodeStatus};
pub use policy::{FailurePolicy, OutputSink};
pub use runner::ClusterRunner;
