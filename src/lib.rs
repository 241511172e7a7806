//! Artigraph bootstraps a graph-backed artifact metadata store.
//!
//! An embedded key/column storage node is started, a graph is opened in one
//! of its keyspaces, a fixed schema and its composite indexes are committed,
//! and a write/read smoke test runs once every index is enabled. See
//! [`bootstrap::Orchestrator`] for the sequence.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod graph;
pub mod storage;

pub use bootstrap::{BootstrapReport, Orchestrator, Stage};
pub use config::{BootstrapConfig, ConfigError};
pub use error::{GraphError, Result};
