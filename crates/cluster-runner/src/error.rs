//! Error types for the cluster runner.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::{EngineError, EngineResponse, HealthResponse};
use crate::health::Diagnostic;

/// Cluster runner errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error. No node is started when this is returned from a build.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A node failed to create its directories or to start its engine.
    #[error("Node {index} failed to start: {reason}")]
    StartupFailed { index: usize, reason: String },

    /// A node with the same index is already part of the fleet.
    #[error("Node {0} is already started")]
    NodeAlreadyStarted(usize),

    /// Fleet position out of range.
    #[error("Node position {index} out of range (fleet size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Removing a path during a tree delete failed.
    #[error("Failed to delete {path}: {source}")]
    DeletionFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A path still exists after it was deleted.
    #[error("Failed to delete {path}: path still exists after deletion")]
    DeletionVerificationFailed { path: PathBuf },

    /// A health or relocation wait hit the engine-side timeout.
    #[error("{message}")]
    HealthTimeout {
        message: String,
        response: Box<HealthResponse>,
        diagnostic: Box<Diagnostic>,
    },

    /// An engine response signalled a failed operation.
    #[error("{message}")]
    OperationFailed {
        message: String,
        response: Box<EngineResponse>,
    },

    /// The engine rejected a call outright.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type for cluster runner operations.
pub type Result<T> = std::result::Result<T, Error>;
