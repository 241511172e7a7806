use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::PropertyValue;

/// Data type of a property key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Int64,
    /// Point in time with offset.
    Timestamp,
    /// Set of strings stored as a single value.
    StringSet,
}

/// How many values one vertex may hold for a key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// One value.
    #[default]
    Single,
    /// Distinct values.
    Set,
    /// Ordered values, duplicates allowed.
    List,
}

/// Allowed edge counts between endpoint pairs of an edge label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// At most one edge in and one out per vertex.
    OneToOne,
    /// Many out-vertices share one in-vertex.
    ManyToOne,
    /// One out-vertex fans out to many in-vertices.
    OneToMany,
    /// Unrestricted.
    #[default]
    ManyToMany,
}

/// A typed property key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKeyDef {
    /// Key name.
    pub name: String,
    /// Value type.
    pub kind: ScalarKind,
    /// Values per vertex.
    pub cardinality: Cardinality,
}

impl PropertyKeyDef {
    /// Single-cardinality key of the given kind.
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cardinality: Cardinality::Single,
        }
    }

    /// Replaces the cardinality.
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }
}

/// A vertex label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLabelDef {
    /// Label name.
    pub name: String,
}

impl VertexLabelDef {
    /// Creates a vertex label definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An edge label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLabelDef {
    /// Label name.
    pub name: String,
    /// Edge multiplicity.
    pub multiplicity: Multiplicity,
}

impl EdgeLabelDef {
    /// Creates an edge label definition.
    pub fn new(name: impl Into<String>, multiplicity: Multiplicity) -> Self {
        Self {
            name: name.into(),
            multiplicity,
        }
    }
}

/// Index implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact-match lookup stored in the graph keyspace.
    Composite,
    /// Range and full-text lookup through an external index backend.
    Mixed,
}

/// A secondary index over a vertex label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, see [`derive_index_name`].
    pub name: String,
    /// Indexed vertex label.
    pub label: String,
    /// Indexed keys in order.
    pub keys: Vec<String>,
    /// Implementation.
    pub kind: IndexKind,
}

impl IndexDef {
    /// Composite index over `keys` of `label`, named by [`derive_index_name`].
    pub fn composite<I, K>(label: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::with_kind(IndexKind::Composite, label.into(), keys)
    }

    /// Mixed index over `keys` of `label`.
    pub fn mixed<I, K>(label: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::with_kind(IndexKind::Mixed, label.into(), keys)
    }

    fn with_kind<I, K>(kind: IndexKind, label: String, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        Self {
            name: derive_index_name(&label, &keys),
            label,
            keys,
            kind,
        }
    }

    /// Whether `other` describes the same index, ignoring the name.
    pub fn same_shape(&self, other: &IndexDef) -> bool {
        self.label == other.label && self.keys == other.keys && self.kind == other.kind
    }
}

/// Name of the index over `keys` of `label`: the label followed by each key, dot separated.
///
/// ```
/// use artigraph::graph::derive_index_name;
/// assert_eq!(derive_index_name("ArtifactCoordinates", &["path"]), "ArtifactCoordinates.path");
/// ```
pub fn derive_index_name<K: AsRef<str>>(label: &str, keys: &[K]) -> String {
    let mut name = String::from(label);
    for key in keys {
        name.push('.');
        name.push_str(key.as_ref());
    }
    name
}

/// Index readiness. Advances installed, registered, enabled, or stops at disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Defined, not yet acknowledged by the lifecycle worker.
    Installed,
    /// Keys resolved; awaiting backfill.
    Registered,
    /// Backfilled and answering queries.
    Enabled,
    /// Terminal failure.
    Disabled,
}

impl IndexStatus {
    /// Stored form.
    pub fn as_str(self) -> &'static str {
        match self {
            IndexStatus::Installed => "installed",
            IndexStatus::Registered => "registered",
            IndexStatus::Enabled => "enabled",
            IndexStatus::Disabled => "disabled",
        }
    }

    /// Parses the stored form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "installed" => Some(IndexStatus::Installed),
            "registered" => Some(IndexStatus::Registered),
            "enabled" => Some(IndexStatus::Enabled),
            "disabled" => Some(IndexStatus::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-allocated vertex identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A vertex with its properties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vertex {
    /// Identifier.
    pub id: VertexId,
    /// Vertex label.
    pub label: String,
    /// Property values by key.
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Vertex {
    /// Value of `key`, if set.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
