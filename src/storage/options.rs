use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// SQLite durability mode applied to every keyspace file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    /// fsync on every commit.
    Full,
    /// fsync at WAL checkpoints only.
    #[default]
    Normal,
    /// Never fsync.
    Off,
}

impl Synchronous {
    pub(crate) fn pragma_value(self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
            Synchronous::Off => "OFF",
        }
    }
}

/// Configuration options supplied when launching a storage node.
#[derive(Clone, Debug)]
pub struct StorageOptions {
    /// Directory holding keyspace files; a scratch directory is created when `None`.
    pub data_dir: Option<PathBuf>,
    /// Interface to bind.
    pub host: String,
    /// Port to bind, `0` for any free port.
    pub port: u16,
    /// Maximum time to wait for the node to report ready.
    pub startup_timeout: Duration,
    /// Worker threads of the node's runtime.
    pub worker_threads: usize,
    /// Durability mode for keyspace files.
    pub synchronous: Synchronous,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            host: "127.0.0.1".to_string(),
            port: 0,
            startup_timeout: Duration::from_secs(30),
            worker_threads: 2,
            synchronous: Synchronous::Normal,
        }
    }
}

impl StorageOptions {
    /// Sets the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the bind interface.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the readiness deadline.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the runtime worker thread count.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the durability mode.
    pub fn synchronous(mut self, mode: Synchronous) -> Self {
        self.synchronous = mode;
        self
    }
}
