use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::storage::Endpoint;

use super::config::{GraphConfig, OptionValue};
use super::engine::{GraphEngine, GraphHandle};

/// Opens, closes and drops graphs on a storage node.
#[derive(Clone, Debug, Default)]
pub struct GraphEngineManager {
    lifecycle_interval: Option<Duration>,
}

impl GraphEngineManager {
    /// Manager with default engine settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the idle interval of each graph's index lifecycle worker.
    pub fn with_lifecycle_interval(mut self, interval: Duration) -> Self {
        self.lifecycle_interval = Some(interval);
        self
    }

    /// Opens `keyspace` on the node at `endpoint`.
    ///
    /// `extra` options are applied after the endpoint-derived ones and may
    /// override them; unrecognized or mistyped options fail before any
    /// connection is made.
    pub fn open(
        &self,
        endpoint: &Endpoint,
        keyspace: &str,
        tx_log: bool,
        extra: &[(String, OptionValue)],
    ) -> Result<GraphHandle> {
        let mut builder = GraphConfig::for_endpoint(endpoint, keyspace, tx_log).set_all(extra)?;
        if let Some(interval) = self.lifecycle_interval {
            builder = builder.lifecycle_interval(interval);
        }
        let config = builder.build()?;
        debug!(?config, "graph.manager.opening");
        Ok(Arc::new(GraphEngine::open(config)?))
    }

    /// Closes `handle`. Idempotent.
    pub fn close(&self, handle: &GraphHandle) -> Result<()> {
        handle.close()
    }

    /// Closes `handle` and deletes its keyspace. Idempotent.
    pub fn drop_graph(&self, handle: &GraphHandle) -> Result<()> {
        handle.drop_graph()
    }
}
