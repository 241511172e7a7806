//! Crate error type and the exit status each error class maps to.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while bootstrapping, operating or tearing down the metadata graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The storage node did not become ready, or could not be launched at all.
    #[error("storage node failed to start: {0}")]
    Startup(String),
    /// A schema definition conflicts with an existing one, or references one that is missing.
    #[error("schema error: {0}")]
    Schema(String),
    /// An index reached the `disabled` status while being awaited.
    #[error("index {index} was disabled before it became queryable")]
    IndexBuild {
        /// Name of the disabled index.
        index: String,
    },
    /// Indexes did not converge to `enabled` before the deadline.
    #[error("indexes not enabled after {waited:?}: {pending:?}")]
    IndexBuildTimeout {
        /// Indexes still short of `enabled` when the deadline passed.
        pending: Vec<String>,
        /// Time spent waiting.
        waited: Duration,
    },
    /// A teardown step failed. Only ever logged.
    #[error("teardown step {step} failed: {message}")]
    Teardown {
        /// The teardown step that failed.
        step: &'static str,
        /// Failure description.
        message: String,
    },
    /// The write/read smoke test observed an unexpected result.
    #[error("smoke test failed: {0}")]
    SmokeTest(String),
    /// The storage node rejected a request or the connection broke.
    #[error("storage request failed: {0}")]
    Storage(String),
    /// A transaction was used after it finished.
    #[error("transaction error: {0}")]
    Transaction(&'static str),
    /// A single-use resource was used out of order.
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),
    /// Configuration could not be loaded or was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The embedded key/column store failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl GraphError {
    /// Process exit status reported by the bootstrap binary for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            GraphError::Startup(_) => 2,
            GraphError::Schema(_) => 3,
            GraphError::IndexBuild { .. } | GraphError::IndexBuildTimeout { .. } => 4,
            GraphError::SmokeTest(_) => 5,
            GraphError::Config(_) => 6,
            _ => 1,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        GraphError::Schema(message.into())
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        GraphError::Storage(message.into())
    }
}
