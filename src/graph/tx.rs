use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::error::{GraphError, Result};
use crate::storage::Mutation;

use super::catalog::SchemaSnapshot;
use super::engine::GraphEngine;
use super::layout::{
    decode_vertices, entry_vertex_ids, index_entry_row, index_mutations, txlog_row,
    vertex_mutations, vertex_row, RECORD_COLUMN, TXLOG_COUNTER, VERTEX_COUNTER, VERTEX_PREFIX,
};
use super::schema::{IndexKind, IndexStatus, Vertex, VertexId};
use super::value::PropertyValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Serialize)]
struct TxLogRecord<'a> {
    vertices: Vec<u64>,
    labels: Vec<&'a str>,
    #[serde(with = "time::serde::rfc3339")]
    committed_at: OffsetDateTime,
}

/// A data transaction.
///
/// Added vertices stay local until [`GraphTx::commit`]; queries through this
/// transaction see them alongside committed data. Dropping an open transaction
/// rolls it back.
pub struct GraphTx<'g> {
    engine: &'g GraphEngine,
    schema: SchemaSnapshot,
    pending: Vec<Vertex>,
    state: TxState,
}

impl<'g> GraphTx<'g> {
    pub(crate) fn new(engine: &'g GraphEngine, schema: SchemaSnapshot) -> Self {
        Self {
            engine,
            schema,
            pending: Vec::new(),
            state: TxState::Open,
        }
    }

    /// Whether the transaction can still be used.
    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    /// Adds a vertex with `label` and `properties`.
    ///
    /// # Errors
    ///
    /// [`GraphError::Schema`] when the label or a key is undefined, or a value
    /// does not conform to its key.
    pub fn add_vertex<I, K>(&mut self, label: &str, properties: I) -> Result<VertexId>
    where
        I: IntoIterator<Item = (K, PropertyValue)>,
        K: Into<String>,
    {
        self.ensure_open()?;
        if self.schema.vertex_label(label).is_none() {
            return Err(GraphError::schema(format!("vertex label {label} is not defined")));
        }
        let mut props = BTreeMap::new();
        for (key, value) in properties {
            let key = key.into();
            let def = self.schema.property_key(&key).ok_or_else(|| {
                GraphError::schema(format!("property key {key} is not defined"))
            })?;
            if !value.conforms_to(def) {
                return Err(GraphError::schema(format!(
                    "value {value} does not conform to {key} ({:?}, {:?})",
                    def.kind, def.cardinality
                )));
            }
            props.insert(key, value);
        }
        let id = VertexId(
            self.engine
                .client()
                .allocate(self.engine.keyspace(), VERTEX_COUNTER, 1)?,
        );
        trace!(%id, label, "graph.tx.vertex_added");
        self.pending.push(Vertex {
            id,
            label: label.to_string(),
            properties: props,
        });
        Ok(id)
    }

    /// Vertex by id, pending or committed.
    pub fn vertex(&self, id: VertexId) -> Result<Option<Vertex>> {
        self.ensure_open()?;
        if let Some(vertex) = self.pending.iter().find(|v| v.id == id) {
            return Ok(Some(vertex.clone()));
        }
        let cells = self
            .engine
            .client()
            .row(self.engine.keyspace(), &vertex_row(id))?;
        Ok(decode_vertices(cells)?.into_iter().next())
    }

    /// Vertices of `label` whose `key` equals `value`.
    ///
    /// Committed vertices are found through an enabled single-key composite
    /// index when one exists, else by scanning every vertex. Pending vertices
    /// of this transaction are always included.
    pub fn has(&self, label: &str, key: &str, value: &PropertyValue) -> Result<Vec<Vertex>> {
        self.ensure_open()?;
        let client = self.engine.client();
        let keyspace = self.engine.keyspace();
        let schema = self.engine.schema()?;
        let index = match value {
            PropertyValue::StringSet(_) => None,
            _ => schema.indexes_on(label).find(|record| {
                record.status == IndexStatus::Enabled
                    && record.def.kind == IndexKind::Composite
                    && record.def.keys.len() == 1
                    && record.def.keys[0] == key
            }),
        };
        let committed = match index {
            Some(record) => {
                let mut found = Vec::new();
                for term in value.index_terms() {
                    let entry = index_entry_row(&record.def.name, &[term])?;
                    for id in entry_vertex_ids(&client.row(keyspace, &entry)?) {
                        found.extend(decode_vertices(client.row(keyspace, &vertex_row(id))?)?);
                    }
                }
                debug!(index = %record.def.name, hits = found.len(), "graph.tx.index_lookup");
                found
            }
            None => {
                let all = decode_vertices(client.scan(keyspace, VERTEX_PREFIX)?)?;
                debug!(label, key, scanned = all.len(), "graph.tx.full_scan");
                all
            }
        };
        let mut results: Vec<Vertex> = committed
            .into_iter()
            .chain(self.pending.iter().cloned())
            .filter(|vertex| {
                vertex.label == label
                    && vertex
                        .property(key)
                        .is_some_and(|stored| stored.matches(value))
            })
            .collect();
        results.sort_by_key(|vertex| vertex.id);
        results.dedup_by_key(|vertex| vertex.id);
        Ok(results)
    }

    /// Writes pending vertices, their index entries and, when enabled, a
    /// transaction log record in one batch.
    pub fn commit(mut self) -> Result<Vec<VertexId>> {
        self.ensure_open()?;
        self.finish(TxState::Committed);
        let client = self.engine.client();
        let keyspace = self.engine.keyspace();
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.engine.schema()?;
        let mut mutations = Vec::new();
        for vertex in &self.pending {
            mutations.extend(vertex_mutations(vertex)?);
            for record in schema
                .indexes_on(&vertex.label)
                .filter(|record| record.status != IndexStatus::Disabled)
            {
                mutations.extend(index_mutations(&record.def, vertex)?);
            }
        }
        if self.engine.config().tx_log() {
            let seq = client.allocate(keyspace, TXLOG_COUNTER, 1)?;
            let record = TxLogRecord {
                vertices: self.pending.iter().map(|v| v.id.0).collect(),
                labels: self.pending.iter().map(|v| v.label.as_str()).collect(),
                committed_at: OffsetDateTime::now_utc(),
            };
            mutations.push(Mutation::put(
                txlog_row(seq),
                RECORD_COLUMN,
                serde_json::to_string(&record)?,
            ));
        }
        client.batch(keyspace, mutations)?;
        let ids: Vec<VertexId> = self.pending.iter().map(|v| v.id).collect();
        debug!(keyspace, vertices = ids.len(), "graph.tx.committed");
        Ok(ids)
    }

    /// Discards every pending vertex.
    pub fn rollback(mut self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        if self.state != TxState::Open {
            return;
        }
        self.finish(TxState::RolledBack);
        debug!(
            keyspace = self.engine.keyspace(),
            discarded = self.pending.len(),
            "graph.tx.rolled_back"
        );
        self.pending.clear();
    }

    fn finish(&mut self, state: TxState) {
        self.state = state;
        self.engine.transaction_finished();
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Committed => Err(GraphError::Transaction("transaction already committed")),
            TxState::RolledBack => Err(GraphError::Transaction("transaction already rolled back")),
        }
    }
}

impl Drop for GraphTx<'_> {
    fn drop(&mut self) {
        self.rollback_in_place();
    }
}
