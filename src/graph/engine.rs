use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{GraphError, Result};
use crate::storage::StorageClient;

use super::catalog::SchemaSnapshot;
use super::config::GraphConfig;
use super::layout::{index_row, STATUS_COLUMN};
use super::lifecycle::IndexLifecycleWorker;
use super::management::ManagementTx;
use super::schema::IndexStatus;
use super::tx::GraphTx;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to an open graph.
pub type GraphHandle = Arc<GraphEngine>;

/// A graph stored in one keyspace of a storage node.
///
/// Owns one storage connection and the index lifecycle thread. [`close`]
/// releases both; [`drop_graph`] additionally deletes the keyspace. Both are
/// idempotent, and dropping the engine closes it.
///
/// [`close`]: GraphEngine::close
/// [`drop_graph`]: GraphEngine::drop_graph
pub struct GraphEngine {
    config: GraphConfig,
    client: Arc<StorageClient>,
    worker: Mutex<Option<IndexLifecycleWorker>>,
    open_transactions: AtomicUsize,
    closed: AtomicBool,
    dropped: AtomicBool,
}

impl GraphEngine {
    /// Connects to the configured node, creates the keyspace if absent and
    /// starts the index lifecycle worker.
    pub fn open(config: GraphConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let client = Arc::new(StorageClient::connect(&endpoint, CONNECT_TIMEOUT)?);
        client.ping()?;
        let existed = client.keyspace_exists(config.keyspace())?;
        client.create_keyspace(config.keyspace())?;
        let worker = IndexLifecycleWorker::spawn(
            Arc::clone(&client),
            config.keyspace().to_string(),
            config.lifecycle_interval(),
        )?;
        info!(
            endpoint = %endpoint,
            keyspace = config.keyspace(),
            existed,
            tx_log = config.tx_log(),
            "graph.opened"
        );
        Ok(Self {
            config,
            client,
            worker: Mutex::new(Some(worker)),
            open_transactions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
        })
    }

    /// Configuration the engine was opened with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Keyspace holding this graph.
    pub fn keyspace(&self) -> &str {
        self.config.keyspace()
    }

    /// Whether [`GraphEngine::close`] has not run yet.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Reads the committed schema.
    pub fn schema(&self) -> Result<SchemaSnapshot> {
        self.ensure_open()?;
        SchemaSnapshot::load(&self.client, self.keyspace())
    }

    /// Opens a schema transaction.
    pub fn management(&self) -> Result<ManagementTx<'_>> {
        let committed = self.schema()?;
        Ok(ManagementTx::new(self, committed))
    }

    /// Opens a data transaction.
    pub fn new_transaction(&self) -> Result<GraphTx<'_>> {
        let schema = self.schema()?;
        self.open_transactions.fetch_add(1, Ordering::AcqRel);
        Ok(GraphTx::new(self, schema))
    }

    /// Data transactions opened and not yet committed or rolled back.
    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::Acquire)
    }

    /// Current status of index `name`, `None` when no such index exists.
    pub fn index_status(&self, name: &str) -> Result<Option<IndexStatus>> {
        self.ensure_open()?;
        match self.client.get(self.keyspace(), &index_row(name), STATUS_COLUMN)? {
            Some(raw) => IndexStatus::parse(&raw).map(Some).ok_or_else(|| {
                GraphError::storage(format!("index {name} has unknown status {raw:?}"))
            }),
            None => Ok(None),
        }
    }

    /// Stops the index lifecycle worker and releases the connection.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let worker = self.worker.lock().take();
        let stopped = match worker {
            Some(mut worker) => worker.shutdown(),
            None => Ok(()),
        };
        self.client.close();
        info!(keyspace = self.keyspace(), "graph.closed");
        stopped
    }

    /// Closes the graph and deletes its keyspace.
    ///
    /// Callers must have finished every transaction first. Open transactions
    /// are reported but not waited for.
    pub fn drop_graph(&self) -> Result<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Ok(());
        }
        let open = self.open_transactions();
        if open > 0 {
            warn!(keyspace = self.keyspace(), open, "graph.drop.open_transactions");
        }
        self.close()?;
        let client = StorageClient::connect(&self.config.endpoint(), CONNECT_TIMEOUT)?;
        let existed = client.drop_keyspace(self.keyspace())?;
        client.close();
        self.dropped.store(true, Ordering::Release);
        info!(keyspace = self.keyspace(), existed, "graph.dropped");
        Ok(())
    }

    pub(crate) fn client(&self) -> &StorageClient {
        &self.client
    }

    pub(crate) fn wake_index_lifecycle(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.trigger();
        }
    }

    pub(crate) fn transaction_finished(&self) {
        let _ = self
            .open_transactions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphError::Lifecycle("graph is closed"));
        }
        Ok(())
    }
}

impl Drop for GraphEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "graph.drop_close_failed");
        }
    }
}
