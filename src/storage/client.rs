use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{GraphError, Result};

use super::lifecycle::Endpoint;
use super::wire::{Cell, Mutation, Request, Response, PROTOCOL};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// Blocking client for the storage node's wire protocol.
///
/// One TCP connection, shared behind a mutex; requests are serialized.
pub struct StorageClient {
    endpoint: Endpoint,
    conn: Mutex<Option<Connection>>,
}

impl StorageClient {
    /// Connects to `endpoint`, giving up after `timeout`.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| GraphError::storage(format!("{endpoint} did not resolve")))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            endpoint: endpoint.clone(),
            conn: Mutex::new(Some(Connection {
                reader,
                writer: stream,
            })),
        })
    }

    /// Endpoint this client is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Sends one request and waits for its response. Error responses become
    /// [`GraphError::Storage`].
    pub fn call(&self, request: &Request) -> Result<Response> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or(GraphError::Lifecycle("storage client is closed"))?;
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        conn.writer.write_all(line.as_bytes())?;
        conn.writer.flush()?;
        let mut buf = String::new();
        if conn.reader.read_line(&mut buf)? == 0 {
            *guard = None;
            return Err(GraphError::storage(format!(
                "{} closed the connection",
                self.endpoint
            )));
        }
        match serde_json::from_str::<Response>(&buf)? {
            Response::Error { message } => Err(GraphError::Storage(message)),
            response => Ok(response),
        }
    }

    /// Closes the connection. Later calls fail; closing twice is a no-op.
    pub fn close(&self) {
        if let Some(conn) = self.conn.lock().take() {
            let _ = conn.writer.shutdown(Shutdown::Both);
            debug!(endpoint = %self.endpoint, "storage.client.closed");
        }
    }

    /// Whether [`StorageClient::close`] has run or the node hung up.
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    /// Succeeds only when the node is ready and speaks [`PROTOCOL`].
    pub fn ping(&self) -> Result<()> {
        match self.call(&Request::Ping)? {
            Response::Pong { protocol } if protocol == PROTOCOL => Ok(()),
            Response::Pong { protocol } => Err(GraphError::storage(format!(
                "{} speaks {protocol}, expected {PROTOCOL}",
                self.endpoint
            ))),
            other => Err(unexpected(other)),
        }
    }

    /// Creates `keyspace` if absent.
    pub fn create_keyspace(&self, keyspace: &str) -> Result<()> {
        self.expect_done(&Request::CreateKeyspace {
            keyspace: keyspace.to_string(),
        })
    }

    /// Deletes `keyspace`; returns whether it existed.
    pub fn drop_keyspace(&self, keyspace: &str) -> Result<bool> {
        self.expect_exists(&Request::DropKeyspace {
            keyspace: keyspace.to_string(),
        })
    }

    /// Reports whether `keyspace` exists.
    pub fn keyspace_exists(&self, keyspace: &str) -> Result<bool> {
        self.expect_exists(&Request::KeyspaceExists {
            keyspace: keyspace.to_string(),
        })
    }

    /// Reads a single cell.
    pub fn get(&self, keyspace: &str, row: &str, column: &str) -> Result<Option<String>> {
        match self.call(&Request::Get {
            keyspace: keyspace.to_string(),
            row: row.to_string(),
            column: column.to_string(),
        })? {
            Response::Value { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Reads all cells of a row.
    pub fn row(&self, keyspace: &str, row: &str) -> Result<Vec<Cell>> {
        self.expect_cells(&Request::Row {
            keyspace: keyspace.to_string(),
            row: row.to_string(),
        })
    }

    /// Reads all cells under a row prefix.
    pub fn scan(&self, keyspace: &str, prefix: &str) -> Result<Vec<Cell>> {
        self.expect_cells(&Request::Scan {
            keyspace: keyspace.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Applies mutations atomically. An empty batch is not sent.
    pub fn batch(&self, keyspace: &str, mutations: Vec<Mutation>) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        self.expect_done(&Request::Batch {
            keyspace: keyspace.to_string(),
            mutations,
        })
    }

    /// Reserves `count` values of a counter and returns the first.
    pub fn allocate(&self, keyspace: &str, counter: &str, count: u64) -> Result<u64> {
        match self.call(&Request::Allocate {
            keyspace: keyspace.to_string(),
            counter: counter.to_string(),
            count,
        })? {
            Response::Allocated { start } => Ok(start),
            other => Err(unexpected(other)),
        }
    }

    fn expect_done(&self, request: &Request) -> Result<()> {
        match self.call(request)? {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn expect_exists(&self, request: &Request) -> Result<bool> {
        match self.call(request)? {
            Response::Exists { exists } => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    fn expect_cells(&self, request: &Request) -> Result<Vec<Cell>> {
        match self.call(request)? {
            Response::Cells { cells } => Ok(cells),
            other => Err(unexpected(other)),
        }
    }
}

impl Drop for StorageClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected(response: Response) -> GraphError {
    GraphError::storage(format!("unexpected response: {response:?}"))
}
