//! Graph engine over a storage node keyspace.
//!
//! Schema, vertices, composite index entries and the transaction log all live
//! in one keyspace. Schema changes go through [`ManagementTx`], data through
//! [`GraphTx`]; both buffer writes and commit them as a single storage batch.
//! A background worker per open graph moves new indexes from `installed` to
//! `enabled`.

mod catalog;
mod config;
mod engine;
mod layout;
mod lifecycle;
mod management;
mod manager;
mod schema;
mod tx;
mod value;

pub use catalog::{IndexRecord, SchemaSnapshot};
pub use config::{
    GraphConfig, GraphConfigBuilder, OptionValue, RECOGNIZED_OPTIONS, STORAGE_BACKEND,
    STORAGE_HOSTNAME, STORAGE_KEYSPACE, STORAGE_PORT, TX_LOG,
};
pub use engine::{GraphEngine, GraphHandle};
pub use management::ManagementTx;
pub use manager::GraphEngineManager;
pub use schema::{
    derive_index_name, Cardinality, EdgeLabelDef, IndexDef, IndexKind, IndexStatus,
    Multiplicity, PropertyKeyDef, ScalarKind, Vertex, VertexId, VertexLabelDef,
};
pub use tx::GraphTx;
pub use value::PropertyValue;
