//! Bootstrap configuration loaded from TOML.
//!
//! Every field has a default, so an absent or empty file yields a runnable
//! configuration: an ephemeral storage node on a dynamic localhost port, the
//! `jgex` keyspace with the transaction log enabled, and index polling every
//! 100ms for up to a minute.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::OptionValue;
use crate::storage::{StorageOptions, Synchronous};

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`BootstrapConfig`].
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostics.
        source: toml::de::Error,
    },
    /// Inline TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Syntax(#[from] toml::de::Error),
    /// A graph option key outside the recognized set.
    #[error("unrecognized graph option '{key}'")]
    UnknownOption {
        /// The rejected key.
        key: String,
    },
    /// A recognized graph option carried a value of the wrong type.
    #[error("graph option '{key}' expects {expected}")]
    InvalidOption {
        /// The rejected key.
        key: String,
        /// Human readable description of the accepted values.
        expected: &'static str,
    },
    /// A required graph option was never set.
    #[error("missing required graph option '{key}'")]
    MissingOption {
        /// The missing key.
        key: &'static str,
    },
    /// A value is out of its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for one bootstrap run.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Embedded storage node settings.
    pub storage: StorageSection,
    /// Graph engine settings.
    pub graph: GraphSection,
    /// Index convergence settings.
    pub index: IndexSection,
}

/// `[storage]` section.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Directory holding keyspace files. A scratch directory is used when absent.
    pub data_dir: Option<PathBuf>,
    /// Interface the node binds to.
    pub host: String,
    /// Port the node binds to; `0` picks a free port.
    pub port: u16,
    /// How long to wait for the node to report ready.
    pub startup_timeout_ms: u64,
    /// Worker threads for the node's runtime.
    pub worker_threads: usize,
    /// SQLite synchronous mode for keyspace files.
    pub synchronous: Synchronous,
}

impl Default for StorageSection {
    fn default() -> Self {
        let defaults = StorageOptions::default();
        Self {
            data_dir: None,
            host: defaults.host,
            port: defaults.port,
            startup_timeout_ms: defaults.startup_timeout.as_millis() as u64,
            worker_threads: defaults.worker_threads,
            synchronous: defaults.synchronous,
        }
    }
}

/// `[graph]` section.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphSection {
    /// Keyspace holding schema and graph data.
    pub keyspace: String,
    /// Whether committed data transactions are recorded in the transaction log.
    pub tx_log: bool,
    /// Close instead of drop at teardown, leaving the keyspace in place.
    pub keep_keyspace: bool,
    /// Idle interval of the index lifecycle worker.
    pub lifecycle_interval_ms: u64,
    /// Additional raw options passed to the graph option builder.
    pub options: BTreeMap<String, toml::Value>,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            keyspace: "jgex".to_string(),
            tx_log: true,
            keep_keyspace: false,
            lifecycle_interval_ms: 50,
            options: BTreeMap::new(),
        }
    }
}

/// `[index]` section.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSection {
    /// Delay between index status polls.
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for all indexes to become enabled.
    pub timeout_ms: u64,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 60_000,
        }
    }
}

impl BootstrapConfig {
    /// Loads configuration from `explicit`, else from the default location when a file
    /// exists there, else returns defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => read_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => BootstrapConfig::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: BootstrapConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.startup_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.startup_timeout_ms must be positive".into(),
            ));
        }
        if self.storage.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "storage.worker_threads must be positive".into(),
            ));
        }
        if self.index.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "index.poll_interval_ms must be positive".into(),
            ));
        }
        if self.index.timeout_ms < self.index.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "index.timeout_ms must not be shorter than index.poll_interval_ms".into(),
            ));
        }
        if self.graph.lifecycle_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "graph.lifecycle_interval_ms must be positive".into(),
            ));
        }
        if self.graph.keyspace.trim().is_empty() {
            return Err(ConfigError::Invalid("graph.keyspace must not be empty".into()));
        }
        Ok(())
    }

    /// Storage node options derived from the `[storage]` section.
    pub fn storage_options(&self) -> StorageOptions {
        let mut opts = StorageOptions::default()
            .host(self.storage.host.clone())
            .port(self.storage.port)
            .startup_timeout(Duration::from_millis(self.storage.startup_timeout_ms))
            .worker_threads(self.storage.worker_threads)
            .synchronous(self.storage.synchronous);
        if let Some(dir) = &self.storage.data_dir {
            opts = opts.data_dir(dir.clone());
        }
        opts
    }

    /// Delay between index status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.index.poll_interval_ms)
    }

    /// Idle interval of the index lifecycle worker.
    pub fn lifecycle_interval(&self) -> Duration {
        Duration::from_millis(self.graph.lifecycle_interval_ms)
    }

    /// Deadline for index convergence.
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index.timeout_ms)
    }

    /// Converts `[graph.options]` into typed option values.
    pub fn extra_graph_options(&self) -> Result<Vec<(String, OptionValue)>, ConfigError> {
        self.graph
            .options
            .iter()
            .map(|(key, value)| {
                let converted = match value {
                    toml::Value::String(s) => OptionValue::Str(s.clone()),
                    toml::Value::Integer(i) => OptionValue::Int(*i),
                    toml::Value::Boolean(b) => OptionValue::Bool(*b),
                    _ => {
                        return Err(ConfigError::InvalidOption {
                            key: key.clone(),
                            expected: "a string, integer or boolean",
                        })
                    }
                };
                Ok((key.clone(), converted))
            })
            .collect()
    }
}

fn read_file(path: &Path) -> Result<BootstrapConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Location consulted when no config file is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("artigraph").join("bootstrap.toml"))
}
