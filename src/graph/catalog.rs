use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{GraphError, Result};
use crate::storage::{Cell, StorageClient};

use super::layout::{
    DEF_COLUMN, EDGE_LABEL_PREFIX, INDEX_PREFIX, PROPERTY_PREFIX, SCHEMA_PREFIX, STATUS_COLUMN,
    VERTEX_LABEL_PREFIX,
};
use super::schema::{
    EdgeLabelDef, IndexDef, IndexStatus, PropertyKeyDef, VertexLabelDef,
};

/// An index definition with its current status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    /// The definition.
    pub def: IndexDef,
    /// Status when the snapshot was read.
    pub status: IndexStatus,
}

/// Committed schema of a graph, read in one scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub(crate) property_keys: BTreeMap<String, PropertyKeyDef>,
    pub(crate) vertex_labels: BTreeMap<String, VertexLabelDef>,
    pub(crate) edge_labels: BTreeMap<String, EdgeLabelDef>,
    pub(crate) indexes: BTreeMap<String, IndexRecord>,
}

impl SchemaSnapshot {
    pub(crate) fn load(client: &StorageClient, keyspace: &str) -> Result<Self> {
        Self::from_cells(client.scan(keyspace, SCHEMA_PREFIX)?)
    }

    pub(crate) fn from_cells(cells: Vec<Cell>) -> Result<Self> {
        let mut snapshot = SchemaSnapshot::default();
        let mut statuses: BTreeMap<String, IndexStatus> = BTreeMap::new();
        for cell in cells {
            if let Some(name) = cell.row.strip_prefix(INDEX_PREFIX) {
                match cell.column.as_str() {
                    DEF_COLUMN => {
                        let def: IndexDef = serde_json::from_str(&cell.value)?;
                        snapshot.indexes.insert(
                            name.to_string(),
                            IndexRecord {
                                def,
                                status: IndexStatus::Installed,
                            },
                        );
                    }
                    STATUS_COLUMN => {
                        let status = IndexStatus::parse(&cell.value).ok_or_else(|| {
                            GraphError::storage(format!(
                                "index {name} has unknown status {:?}",
                                cell.value
                            ))
                        })?;
                        statuses.insert(name.to_string(), status);
                    }
                    _ => {}
                }
                continue;
            }
            if cell.column != DEF_COLUMN {
                continue;
            }
            if let Some(name) = cell.row.strip_prefix(PROPERTY_PREFIX) {
                snapshot
                    .property_keys
                    .insert(name.to_string(), serde_json::from_str(&cell.value)?);
            } else if let Some(name) = cell.row.strip_prefix(VERTEX_LABEL_PREFIX) {
                snapshot
                    .vertex_labels
                    .insert(name.to_string(), serde_json::from_str(&cell.value)?);
            } else if let Some(name) = cell.row.strip_prefix(EDGE_LABEL_PREFIX) {
                snapshot
                    .edge_labels
                    .insert(name.to_string(), serde_json::from_str(&cell.value)?);
            }
        }
        for (name, status) in statuses {
            if let Some(record) = snapshot.indexes.get_mut(&name) {
                record.status = status;
            }
        }
        Ok(snapshot)
    }

    /// Property key by name.
    pub fn property_key(&self, name: &str) -> Option<&PropertyKeyDef> {
        self.property_keys.get(name)
    }

    /// Vertex label by name.
    pub fn vertex_label(&self, name: &str) -> Option<&VertexLabelDef> {
        self.vertex_labels.get(name)
    }

    /// Edge label by name.
    pub fn edge_label(&self, name: &str) -> Option<&EdgeLabelDef> {
        self.edge_labels.get(name)
    }

    /// Index by name.
    pub fn index(&self, name: &str) -> Option<&IndexRecord> {
        self.indexes.get(name)
    }

    /// All property keys, by name.
    pub fn property_keys(&self) -> impl Iterator<Item = &PropertyKeyDef> {
        self.property_keys.values()
    }

    /// All vertex labels, by name.
    pub fn vertex_labels(&self) -> impl Iterator<Item = &VertexLabelDef> {
        self.vertex_labels.values()
    }

    /// All edge labels, by name.
    pub fn edge_labels(&self) -> impl Iterator<Item = &EdgeLabelDef> {
        self.edge_labels.values()
    }

    /// All indexes, by name.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexRecord> {
        self.indexes.values()
    }

    /// Indexes over `label`.
    pub fn indexes_on<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a IndexRecord> + 'a {
        self.indexes
            .values()
            .filter(move |record| record.def.label == label)
    }

    /// Whether the snapshot holds no definitions at all.
    pub fn is_empty(&self) -> bool {
        self.property_keys.is_empty()
            && self.vertex_labels.is_empty()
            && self.edge_labels.is_empty()
            && self.indexes.is_empty()
    }

    /// Human readable listing of every definition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Property keys ({}):", self.property_keys.len());
        for key in self.property_keys.values() {
            let _ = writeln!(
                out,
                "  {:<16} {:?} {:?}",
                key.name, key.kind, key.cardinality
            );
        }
        let _ = writeln!(out, "Vertex labels ({}):", self.vertex_labels.len());
        for label in self.vertex_labels.values() {
            let _ = writeln!(out, "  {}", label.name);
        }
        let _ = writeln!(out, "Edge labels ({}):", self.edge_labels.len());
        for label in self.edge_labels.values() {
            let _ = writeln!(out, "  {:<36} {:?}", label.name, label.multiplicity);
        }
        let _ = writeln!(out, "Indexes ({}):", self.indexes.len());
        for record in self.indexes.values() {
            let _ = writeln!(
                out,
                "  {:<36} {:?} on {}({}) {}",
                record.def.name,
                record.def.kind,
                record.def.label,
                record.def.keys.join(", "),
                record.status
            );
        }
        out
    }
}
