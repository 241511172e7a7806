use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::storage::Mutation;

use super::catalog::SchemaSnapshot;
use super::engine::GraphEngine;
use super::layout::{
    edge_label_row, index_row, property_row, vertex_label_row, DEF_COLUMN, STATUS_COLUMN,
};
use super::schema::{
    EdgeLabelDef, IndexDef, IndexKind, IndexStatus, PropertyKeyDef, VertexLabelDef,
};

/// A schema transaction.
///
/// Definitions are buffered and written as one atomic batch on
/// [`ManagementTx::commit`]. Lookups see the committed schema as of
/// [`GraphEngine::management`] plus this transaction's own definitions.
/// Dropping an uncommitted transaction discards it.
pub struct ManagementTx<'g> {
    engine: &'g GraphEngine,
    committed: SchemaSnapshot,
    property_keys: BTreeMap<String, PropertyKeyDef>,
    vertex_labels: BTreeMap<String, VertexLabelDef>,
    edge_labels: BTreeMap<String, EdgeLabelDef>,
    indexes: BTreeMap<String, IndexDef>,
    finished: bool,
}

impl<'g> ManagementTx<'g> {
    pub(crate) fn new(engine: &'g GraphEngine, committed: SchemaSnapshot) -> Self {
        Self {
            engine,
            committed,
            property_keys: BTreeMap::new(),
            vertex_labels: BTreeMap::new(),
            edge_labels: BTreeMap::new(),
            indexes: BTreeMap::new(),
            finished: false,
        }
    }

    /// The schema committed before this transaction opened.
    pub fn committed(&self) -> &SchemaSnapshot {
        &self.committed
    }

    /// Property key by name, pending or committed.
    pub fn property_key(&self, name: &str) -> Option<&PropertyKeyDef> {
        self.property_keys
            .get(name)
            .or_else(|| self.committed.property_key(name))
    }

    /// Vertex label by name, pending or committed.
    pub fn vertex_label(&self, name: &str) -> Option<&VertexLabelDef> {
        self.vertex_labels
            .get(name)
            .or_else(|| self.committed.vertex_label(name))
    }

    /// Edge label by name, pending or committed.
    pub fn edge_label(&self, name: &str) -> Option<&EdgeLabelDef> {
        self.edge_labels
            .get(name)
            .or_else(|| self.committed.edge_label(name))
    }

    /// Index definition by name, pending or committed.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes
            .get(name)
            .or_else(|| self.committed.index(name).map(|record| &record.def))
    }

    /// Number of definitions buffered so far.
    pub fn pending(&self) -> usize {
        self.property_keys.len() + self.vertex_labels.len() + self.edge_labels.len() + self.indexes.len()
    }

    /// Defines a property key.
    pub fn make_property_key(&mut self, def: PropertyKeyDef) -> Result<()> {
        self.ensure_open()?;
        check_name("property key", &def.name)?;
        if self.property_key(&def.name).is_some() {
            return Err(GraphError::schema(format!(
                "property key {} is already defined",
                def.name
            )));
        }
        self.property_keys.insert(def.name.clone(), def);
        Ok(())
    }

    /// Defines a vertex label. Vertex and edge labels share one namespace.
    pub fn make_vertex_label(&mut self, def: VertexLabelDef) -> Result<()> {
        self.ensure_open()?;
        check_name("vertex label", &def.name)?;
        if self.vertex_label(&def.name).is_some() || self.edge_label(&def.name).is_some() {
            return Err(GraphError::schema(format!(
                "label {} is already defined",
                def.name
            )));
        }
        self.vertex_labels.insert(def.name.clone(), def);
        Ok(())
    }

    /// Defines an edge label. Vertex and edge labels share one namespace.
    pub fn make_edge_label(&mut self, def: EdgeLabelDef) -> Result<()> {
        self.ensure_open()?;
        check_name("edge label", &def.name)?;
        if self.vertex_label(&def.name).is_some() || self.edge_label(&def.name).is_some() {
            return Err(GraphError::schema(format!(
                "label {} is already defined",
                def.name
            )));
        }
        self.edge_labels.insert(def.name.clone(), def);
        Ok(())
    }

    /// Registers a composite index in status `installed`.
    ///
    /// The label and every key must already be committed; definitions made
    /// earlier in this transaction do not count.
    pub fn build_index(&mut self, def: IndexDef) -> Result<()> {
        self.ensure_open()?;
        if def.kind == IndexKind::Mixed {
            return Err(GraphError::schema(format!(
                "index {} is mixed; no external index backend is configured",
                def.name
            )));
        }
        if def.keys.is_empty() {
            return Err(GraphError::schema(format!("index {} has no keys", def.name)));
        }
        if self.committed.vertex_label(&def.label).is_none() {
            return Err(GraphError::schema(format!(
                "index {} references uncommitted vertex label {}",
                def.name, def.label
            )));
        }
        if let Some(key) = def
            .keys
            .iter()
            .find(|key| self.committed.property_key(key).is_none())
        {
            return Err(GraphError::schema(format!(
                "index {} references uncommitted property key {key}",
                def.name
            )));
        }
        if self.index(&def.name).is_some() {
            return Err(GraphError::schema(format!(
                "index {} is already defined",
                def.name
            )));
        }
        self.indexes.insert(def.name.clone(), def);
        Ok(())
    }

    /// Writes every pending definition in one batch and wakes the index
    /// lifecycle worker when indexes were added.
    pub fn commit(mut self) -> Result<usize> {
        self.ensure_open()?;
        self.finished = true;
        let mut mutations = Vec::with_capacity(self.pending() + self.indexes.len());
        for def in self.property_keys.values() {
            mutations.push(Mutation::put(
                property_row(&def.name),
                DEF_COLUMN,
                serde_json::to_string(def)?,
            ));
        }
        for def in self.vertex_labels.values() {
            mutations.push(Mutation::put(
                vertex_label_row(&def.name),
                DEF_COLUMN,
                serde_json::to_string(def)?,
            ));
        }
        for def in self.edge_labels.values() {
            mutations.push(Mutation::put(
                edge_label_row(&def.name),
                DEF_COLUMN,
                serde_json::to_string(def)?,
            ));
        }
        for def in self.indexes.values() {
            let row = index_row(&def.name);
            mutations.push(Mutation::put(row.clone(), DEF_COLUMN, serde_json::to_string(def)?));
            mutations.push(Mutation::put(row, STATUS_COLUMN, IndexStatus::Installed.as_str()));
        }
        let definitions = self.pending();
        self.engine.client().batch(self.engine.keyspace(), mutations)?;
        info!(
            keyspace = self.engine.keyspace(),
            property_keys = self.property_keys.len(),
            vertex_labels = self.vertex_labels.len(),
            edge_labels = self.edge_labels.len(),
            indexes = self.indexes.len(),
            "graph.management.committed"
        );
        if !self.indexes.is_empty() {
            self.engine.wake_index_lifecycle();
        }
        Ok(definitions)
    }

    /// Discards every pending definition.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        debug!(
            keyspace = self.engine.keyspace(),
            discarded = self.pending(),
            "graph.management.rolled_back"
        );
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(GraphError::Transaction("management transaction already finished"));
        }
        Ok(())
    }
}

impl Drop for ManagementTx<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(GraphError::schema(format!("invalid {what} name {name:?}")));
    }
    Ok(())
}
