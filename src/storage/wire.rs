//! Line-delimited JSON protocol spoken between the storage node and its clients.
//!
//! Each request and each response is a single JSON object terminated by `\n`.
//! Requests are tagged by `op`, responses by `status`. A connection carries any
//! number of request/response pairs, strictly in order.

use serde::{Deserialize, Serialize};

/// Protocol name reported by `ping`; graph configurations must name it as their backend.
pub const PROTOCOL: &str = "colwire/1";

/// A single stored cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Row key.
    pub row: String,
    /// Column name within the row.
    pub column: String,
    /// Cell payload.
    pub value: String,
}

/// One write in an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert or overwrite a cell.
    Put {
        /// Row key.
        row: String,
        /// Column name.
        column: String,
        /// New payload.
        value: String,
    },
    /// Remove every cell of a row.
    DeleteRow {
        /// Row key.
        row: String,
    },
}

impl Mutation {
    /// Convenience constructor for [`Mutation::Put`].
    pub fn put(row: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        Mutation::Put {
            row: row.into(),
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Client to node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness and readiness probe.
    Ping,
    /// Create a keyspace if it does not exist.
    CreateKeyspace {
        /// Keyspace name.
        keyspace: String,
    },
    /// Delete a keyspace and all of its data.
    DropKeyspace {
        /// Keyspace name.
        keyspace: String,
    },
    /// Report whether a keyspace exists.
    KeyspaceExists {
        /// Keyspace name.
        keyspace: String,
    },
    /// Read one cell.
    Get {
        /// Keyspace name.
        keyspace: String,
        /// Row key.
        row: String,
        /// Column name.
        column: String,
    },
    /// Read every cell of one row.
    Row {
        /// Keyspace name.
        keyspace: String,
        /// Row key.
        row: String,
    },
    /// Read every cell whose row starts with `prefix`, ordered by row then column.
    Scan {
        /// Keyspace name.
        keyspace: String,
        /// Row key prefix.
        prefix: String,
    },
    /// Apply mutations atomically.
    Batch {
        /// Keyspace name.
        keyspace: String,
        /// Mutations in application order.
        mutations: Vec<Mutation>,
    },
    /// Reserve `count` consecutive values of a named counter.
    Allocate {
        /// Keyspace name.
        keyspace: String,
        /// Counter name.
        counter: String,
        /// Block size.
        count: u64,
    },
}

/// Node to client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Answer to [`Request::Ping`] once the node is ready.
    Pong {
        /// Protocol spoken by the node.
        protocol: String,
    },
    /// The request succeeded without a payload.
    Done,
    /// Answer to existence checks and drops.
    Exists {
        /// Whether the keyspace existed.
        exists: bool,
    },
    /// Answer to [`Request::Get`].
    Value {
        /// Cell payload, if the cell exists.
        value: Option<String>,
    },
    /// Answer to [`Request::Row`] and [`Request::Scan`].
    Cells {
        /// Matching cells.
        cells: Vec<Cell>,
    },
    /// Answer to [`Request::Allocate`].
    Allocated {
        /// First value of the reserved block.
        start: u64,
    },
    /// The request failed.
    Error {
        /// Failure description.
        message: String,
    },
}
