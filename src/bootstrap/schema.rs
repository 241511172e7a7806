use std::fmt;

use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::graph::{
    Cardinality, EdgeLabelDef, IndexDef, ManagementTx, Multiplicity, PropertyKeyDef, ScalarKind,
    VertexLabelDef,
};

/// Vertex label of artifact entries.
pub const ARTIFACT_ENTRY: &str = "ArtifactEntry";
/// Vertex label of artifact coordinates.
pub const ARTIFACT_COORDINATES: &str = "ArtifactCoordinates";
/// Edge from an entry to its coordinates.
pub const ARTIFACT_ENTRY_COORDINATES: &str = "ArtifactEntry#ArtifactCoordinates";

/// A set of schema definitions applied together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaDefinition {
    /// Property keys.
    pub property_keys: Vec<PropertyKeyDef>,
    /// Vertex labels.
    pub vertex_labels: Vec<VertexLabelDef>,
    /// Edge labels.
    pub edge_labels: Vec<EdgeLabelDef>,
}

impl SchemaDefinition {
    /// The artifact metadata schema.
    pub fn artifact_metadata() -> Self {
        let string = |name: &str| PropertyKeyDef::new(name, ScalarKind::String);
        Self {
            property_keys: vec![
                string("uuid"),
                string("storageId"),
                string("repositoryId"),
                PropertyKeyDef::new("sizeInBytes", ScalarKind::Int64),
                PropertyKeyDef::new("created", ScalarKind::Timestamp),
                string("tags").with_cardinality(Cardinality::Set),
                string("path"),
                string("version"),
            ],
            vertex_labels: vec![
                VertexLabelDef::new(ARTIFACT_ENTRY),
                VertexLabelDef::new(ARTIFACT_COORDINATES),
            ],
            edge_labels: vec![EdgeLabelDef::new(
                ARTIFACT_ENTRY_COORDINATES,
                Multiplicity::ManyToOne,
            )],
        }
    }

    /// Indexes built over [`SchemaDefinition::artifact_metadata`].
    pub fn artifact_indexes() -> Vec<IndexDef> {
        vec![IndexDef::composite(ARTIFACT_COORDINATES, ["path"])]
    }

    /// Total number of definitions.
    pub fn len(&self) -> usize {
        self.property_keys.len() + self.vertex_labels.len() + self.edge_labels.len()
    }

    /// Whether there are no definitions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of [`SchemaBootstrapper::apply`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Definitions added to the transaction.
    pub created: usize,
    /// Definitions already present with the same shape.
    pub existing: usize,
}

/// Applies a [`SchemaDefinition`] inside a management transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaBootstrapper;

impl SchemaBootstrapper {
    /// Creates every definition that is absent.
    ///
    /// A name that already exists with a different shape is a
    /// [`GraphError::Schema`]. The caller commits the transaction on success
    /// and rolls it back otherwise, so a failed apply leaves no definitions behind.
    pub fn apply(
        &self,
        tx: &mut ManagementTx<'_>,
        defs: &SchemaDefinition,
    ) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();
        for def in &defs.property_keys {
            match tx.property_key(&def.name) {
                Some(existing) if existing == def => summary.existing += 1,
                Some(existing) => {
                    return Err(conflict("property key", &def.name, existing, def));
                }
                None => {
                    tx.make_property_key(def.clone())?;
                    summary.created += 1;
                }
            }
        }
        for def in &defs.vertex_labels {
            if let Some(edge) = tx.edge_label(&def.name) {
                return Err(conflict("vertex label", &def.name, edge, def));
            }
            match tx.vertex_label(&def.name) {
                Some(_) => summary.existing += 1,
                None => {
                    tx.make_vertex_label(def.clone())?;
                    summary.created += 1;
                }
            }
        }
        for def in &defs.edge_labels {
            if let Some(vertex) = tx.vertex_label(&def.name) {
                return Err(conflict("edge label", &def.name, vertex, def));
            }
            match tx.edge_label(&def.name) {
                Some(existing) if existing == def => summary.existing += 1,
                Some(existing) => {
                    return Err(conflict("edge label", &def.name, existing, def));
                }
                None => {
                    tx.make_edge_label(def.clone())?;
                    summary.created += 1;
                }
            }
        }
        debug!(
            created = summary.created,
            existing = summary.existing,
            "bootstrap.schema.applied"
        );
        if summary.created == 0 {
            info!(existing = summary.existing, "bootstrap.schema.already_present");
        }
        Ok(summary)
    }
}

fn conflict(
    what: &str,
    name: &str,
    existing: &impl fmt::Debug,
    wanted: &impl fmt::Debug,
) -> GraphError {
    GraphError::schema(format!(
        "{what} {name} conflicts with an existing definition: have {existing:?}, want {wanted:?}"
    ))
}
