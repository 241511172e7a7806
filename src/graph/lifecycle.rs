use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::storage::{Mutation, StorageClient};

use super::catalog::{IndexRecord, SchemaSnapshot};
use super::layout::{decode_vertices, index_mutations, index_row, STATUS_COLUMN, VERTEX_PREFIX};
use super::schema::IndexStatus;

pub(crate) enum LifecycleMessage {
    Trigger,
    Shutdown,
}

/// Background thread that walks indexes through their statuses.
///
/// Each pass moves every index at most one step: `installed` to `registered`
/// once its label and keys resolve (else `disabled`), then `registered` to
/// `enabled` after existing vertices are backfilled (a failed backfill disables
/// it). Passes run when woken and otherwise once per interval.
pub(crate) struct IndexLifecycleWorker {
    sender: Sender<LifecycleMessage>,
    thread: Option<thread::JoinHandle<()>>,
}

impl IndexLifecycleWorker {
    pub(crate) fn spawn(
        client: Arc<StorageClient>,
        keyspace: String,
        interval: Duration,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("index-lifecycle-{keyspace}"))
            .spawn(move || lifecycle_loop(&client, &keyspace, receiver, interval))?;
        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    /// Requests a pass as soon as possible.
    pub(crate) fn trigger(&self) {
        let _ = self.sender.send(LifecycleMessage::Trigger);
    }

    /// Stops the thread and waits for it. Idempotent.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let _ = self.sender.send(LifecycleMessage::Shutdown);
        thread
            .join()
            .map_err(|_| GraphError::Lifecycle("index lifecycle thread panicked"))
    }
}

impl Drop for IndexLifecycleWorker {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "graph.index_lifecycle.drop_failed");
        }
    }
}

fn lifecycle_loop(
    client: &StorageClient,
    keyspace: &str,
    receiver: Receiver<LifecycleMessage>,
    interval: Duration,
) {
    loop {
        match receiver.recv_timeout(interval) {
            Ok(LifecycleMessage::Trigger) | Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Err(err) = advance(client, keyspace) {
                    if client.is_closed() {
                        break;
                    }
                    warn!(keyspace, error = %err, "graph.index_lifecycle.pass_failed");
                }
            }
            Ok(LifecycleMessage::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(keyspace, "graph.index_lifecycle.stopped");
}

/// Runs one pass. Returns how many indexes changed status.
pub(crate) fn advance(client: &StorageClient, keyspace: &str) -> Result<usize> {
    let schema = SchemaSnapshot::load(client, keyspace)?;
    let mut transitions = 0;
    for record in schema.indexes() {
        let next = match record.status {
            IndexStatus::Installed => {
                if resolves(&schema, record) {
                    IndexStatus::Registered
                } else {
                    IndexStatus::Disabled
                }
            }
            IndexStatus::Registered => match backfill(client, keyspace, record) {
                Ok(entries) => {
                    debug!(index = %record.def.name, entries, "graph.index.backfilled");
                    IndexStatus::Enabled
                }
                Err(err) if client.is_closed() => return Err(err),
                Err(err) => {
                    warn!(index = %record.def.name, error = %err, "graph.index.backfill_failed");
                    IndexStatus::Disabled
                }
            },
            IndexStatus::Enabled | IndexStatus::Disabled => continue,
        };
        client.batch(
            keyspace,
            vec![Mutation::put(
                index_row(&record.def.name),
                STATUS_COLUMN,
                next.as_str(),
            )],
        )?;
        info!(
            index = %record.def.name,
            from = %record.status,
            to = %next,
            "graph.index.status_changed"
        );
        transitions += 1;
    }
    Ok(transitions)
}

fn resolves(schema: &SchemaSnapshot, record: &IndexRecord) -> bool {
    schema.vertex_label(&record.def.label).is_some()
        && !record.def.keys.is_empty()
        && record
            .def
            .keys
            .iter()
            .all(|key| schema.property_key(key).is_some())
}

fn backfill(client: &StorageClient, keyspace: &str, record: &IndexRecord) -> Result<usize> {
    let vertices = decode_vertices(client.scan(keyspace, VERTEX_PREFIX)?)?;
    let mut mutations = Vec::new();
    for vertex in vertices.iter().filter(|v| v.label == record.def.label) {
        mutations.extend(index_mutations(&record.def, vertex)?);
    }
    let entries = mutations.len();
    client.batch(keyspace, mutations)?;
    Ok(entries)
}
