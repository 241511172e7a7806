//! Embedded storage node.
//!
//! A key/column store with one SQLite file per keyspace, served over a
//! line-delimited JSON protocol on a TCP port, plus the lifecycle manager that
//! starts it, waits for readiness and stops it.

mod client;
mod column_store;
mod daemon;
mod lifecycle;
mod options;
mod wire;

/// Blocking protocol client.
pub use client::StorageClient;

/// The key/column store behind the node.
pub use column_store::ColumnStore;

/// The in-process node and its launcher.
pub use daemon::{EmbeddedLauncher, StorageDaemon};

/// Start/stop sequencing and the launcher seam.
pub use lifecycle::{Endpoint, NodeLauncher, NodeProcess, StorageLifecycleManager};

/// Node configuration.
pub use options::{StorageOptions, Synchronous};

/// Wire protocol types.
pub use wire::{Cell, Mutation, Request, Response, PROTOCOL};

pub(crate) use column_store::validate_keyspace;
