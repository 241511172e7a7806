//! Row layout of a graph keyspace.
//!
//! ```text
//! schema.property.<name>   def
//! schema.vertex.<name>     def
//! schema.edge.<name>       def
//! schema.index.<name>      def, status
//! vertex.<id:020>          ~label, p.<key>...
//! index.<name>.<terms>     <vertex id>...
//! txlog.<seq:020>          record
//! ```
//!
//! Cell payloads are JSON. Vertex ids are zero padded so rows sort numerically.

use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::storage::{Cell, Mutation};

use super::schema::{IndexDef, Vertex, VertexId};
use super::value::PropertyValue;

pub(crate) const SCHEMA_PREFIX: &str = "schema.";
pub(crate) const PROPERTY_PREFIX: &str = "schema.property.";
pub(crate) const VERTEX_LABEL_PREFIX: &str = "schema.vertex.";
pub(crate) const EDGE_LABEL_PREFIX: &str = "schema.edge.";
pub(crate) const INDEX_PREFIX: &str = "schema.index.";
pub(crate) const VERTEX_PREFIX: &str = "vertex.";

pub(crate) const DEF_COLUMN: &str = "def";
pub(crate) const STATUS_COLUMN: &str = "status";
pub(crate) const LABEL_COLUMN: &str = "~label";
pub(crate) const RECORD_COLUMN: &str = "record";
pub(crate) const PROPERTY_COLUMN_PREFIX: &str = "p.";

pub(crate) const VERTEX_COUNTER: &str = "vertex";
pub(crate) const TXLOG_COUNTER: &str = "txlog";

pub(crate) fn property_row(name: &str) -> String {
    format!("{PROPERTY_PREFIX}{name}")
}

pub(crate) fn vertex_label_row(name: &str) -> String {
    format!("{VERTEX_LABEL_PREFIX}{name}")
}

pub(crate) fn edge_label_row(name: &str) -> String {
    format!("{EDGE_LABEL_PREFIX}{name}")
}

pub(crate) fn index_row(name: &str) -> String {
    format!("{INDEX_PREFIX}{name}")
}

pub(crate) fn vertex_row(id: VertexId) -> String {
    format!("{VERTEX_PREFIX}{:020}", id.0)
}

pub(crate) fn txlog_row(seq: u64) -> String {
    format!("txlog.{seq:020}")
}

/// Entry row for one combination of index terms.
pub(crate) fn index_entry_row(index: &str, terms: &[PropertyValue]) -> Result<String> {
    Ok(format!("index.{index}.{}", serde_json::to_string(terms)?))
}

/// Entry rows `vertex` belongs to under `index`. Empty when a key is missing;
/// string sets expand to one row per member.
pub(crate) fn index_entry_rows(index: &IndexDef, vertex: &Vertex) -> Result<Vec<String>> {
    if vertex.label != index.label {
        return Ok(Vec::new());
    }
    let mut combos: Vec<Vec<PropertyValue>> = vec![Vec::new()];
    for key in &index.keys {
        let Some(value) = vertex.properties.get(key) else {
            return Ok(Vec::new());
        };
        let terms = value.index_terms();
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                terms.iter().map(move |term| {
                    let mut next = prefix.clone();
                    next.push(term.clone());
                    next
                })
            })
            .collect();
    }
    combos
        .iter()
        .map(|terms| index_entry_row(&index.name, terms))
        .collect()
}

/// Puts that store `vertex`.
pub(crate) fn vertex_mutations(vertex: &Vertex) -> Result<Vec<Mutation>> {
    let row = vertex_row(vertex.id);
    let mut mutations = Vec::with_capacity(vertex.properties.len() + 1);
    mutations.push(Mutation::put(row.clone(), LABEL_COLUMN, vertex.label.clone()));
    for (key, value) in &vertex.properties {
        mutations.push(Mutation::put(
            row.clone(),
            format!("{PROPERTY_COLUMN_PREFIX}{key}"),
            serde_json::to_string(value)?,
        ));
    }
    Ok(mutations)
}

/// Puts that register `vertex` in `index`.
pub(crate) fn index_mutations(index: &IndexDef, vertex: &Vertex) -> Result<Vec<Mutation>> {
    Ok(index_entry_rows(index, vertex)?
        .into_iter()
        .map(|row| Mutation::put(row, vertex.id.0.to_string(), ""))
        .collect())
}

/// Vertex ids listed in the cells of an index entry row.
pub(crate) fn entry_vertex_ids(cells: &[Cell]) -> Vec<VertexId> {
    cells
        .iter()
        .filter_map(|cell| cell.column.parse().ok().map(VertexId))
        .collect()
}

/// Rebuilds vertices from cells of one or more `vertex.` rows, in row order.
pub(crate) fn decode_vertices(cells: Vec<Cell>) -> Result<Vec<Vertex>> {
    let mut rows: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
    for cell in cells {
        rows.entry(cell.row.clone()).or_default().push(cell);
    }
    rows.into_iter()
        .map(|(row, cells)| decode_vertex(&row, cells))
        .collect()
}

fn decode_vertex(row: &str, cells: Vec<Cell>) -> Result<Vertex> {
    let id = row
        .strip_prefix(VERTEX_PREFIX)
        .and_then(|raw| raw.parse().ok())
        .map(VertexId)
        .ok_or_else(|| GraphError::storage(format!("malformed vertex row {row}")))?;
    let mut label = None;
    let mut properties = BTreeMap::new();
    for cell in cells {
        if cell.column == LABEL_COLUMN {
            label = Some(cell.value);
        } else if let Some(key) = cell.column.strip_prefix(PROPERTY_COLUMN_PREFIX) {
            properties.insert(key.to_string(), serde_json::from_str(&cell.value)?);
        }
    }
    let label = label.ok_or_else(|| GraphError::storage(format!("vertex row {row} has no label")))?;
    Ok(Vertex {
        id,
        label,
        properties,
    })
}
