use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, trace};

use crate::error::{GraphError, Result};

use super::options::Synchronous;
use super::wire::{Cell, Mutation, Request, Response, PROTOCOL};

const KEYSPACE_EXT: &str = "ks";
const MAX_KEYSPACE_LEN: usize = 48;

const KEYSPACE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cells (
    row_key TEXT NOT NULL,
    column_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (row_key, column_name)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS counters (
    name TEXT NOT NULL PRIMARY KEY,
    next INTEGER NOT NULL
);
";

/// Key/column store backing the storage node. One SQLite file per keyspace.
pub struct ColumnStore {
    root: PathBuf,
    synchronous: Synchronous,
    open: Mutex<HashMap<String, Connection>>,
}

impl ColumnStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// Keyspaces already on disk are not opened until [`ColumnStore::recover`] runs.
    pub fn open(root: &Path, synchronous: Synchronous) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            synchronous,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the keyspace files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens and integrity-checks every persisted keyspace. Returns how many were found.
    pub fn recover(&self) -> Result<usize> {
        let mut recovered = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(KEYSPACE_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            validate_keyspace(name)?;
            let conn = self.connect(name)?;
            let verdict: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
            if verdict != "ok" {
                return Err(GraphError::storage(format!(
                    "keyspace {name} failed integrity check: {verdict}"
                )));
            }
            self.open.lock().insert(name.to_string(), conn);
            debug!(keyspace = name, "storage.keyspace.recovered");
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Executes one protocol request, folding failures into [`Response::Error`].
    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "storage.request.failed");
                Response::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        trace!(?request, "storage.request");
        match request {
            Request::Ping => Ok(Response::Pong {
                protocol: PROTOCOL.to_string(),
            }),
            Request::CreateKeyspace { keyspace } => {
                self.create_keyspace(&keyspace)?;
                Ok(Response::Done)
            }
            Request::DropKeyspace { keyspace } => Ok(Response::Exists {
                exists: self.drop_keyspace(&keyspace)?,
            }),
            Request::KeyspaceExists { keyspace } => Ok(Response::Exists {
                exists: self.keyspace_exists(&keyspace)?,
            }),
            Request::Get {
                keyspace,
                row,
                column,
            } => Ok(Response::Value {
                value: self.get(&keyspace, &row, &column)?,
            }),
            Request::Row { keyspace, row } => Ok(Response::Cells {
                cells: self.row(&keyspace, &row)?,
            }),
            Request::Scan { keyspace, prefix } => Ok(Response::Cells {
                cells: self.scan(&keyspace, &prefix)?,
            }),
            Request::Batch {
                keyspace,
                mutations,
            } => {
                self.apply(&keyspace, &mutations)?;
                Ok(Response::Done)
            }
            Request::Allocate {
                keyspace,
                counter,
                count,
            } => Ok(Response::Allocated {
                start: self.allocate(&keyspace, &counter, count)?,
            }),
        }
    }

    /// Creates a keyspace. Returns `false` when it already existed.
    pub fn create_keyspace(&self, name: &str) -> Result<bool> {
        validate_keyspace(name)?;
        let mut open = self.open.lock();
        if open.contains_key(name) {
            return Ok(false);
        }
        let existed = self.keyspace_path(name).exists();
        let conn = self.connect(name)?;
        open.insert(name.to_string(), conn);
        if !existed {
            info!(keyspace = name, "storage.keyspace.created");
        }
        Ok(!existed)
    }

    /// Deletes a keyspace and its files. Returns `false` when there was nothing to delete.
    pub fn drop_keyspace(&self, name: &str) -> Result<bool> {
        validate_keyspace(name)?;
        let mut open = self.open.lock();
        if let Some(conn) = open.remove(name) {
            conn.close().map_err(|(_, err)| err)?;
        }
        let path = self.keyspace_path(name);
        let existed = path.exists();
        for suffix in ["", "-wal", "-shm"] {
            let mut target = path.clone().into_os_string();
            target.push(suffix);
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if existed {
            info!(keyspace = name, "storage.keyspace.dropped");
        }
        Ok(existed)
    }

    /// Reports whether a keyspace is open or present on disk.
    pub fn keyspace_exists(&self, name: &str) -> Result<bool> {
        validate_keyspace(name)?;
        if self.open.lock().contains_key(name) {
            return Ok(true);
        }
        Ok(self.keyspace_path(name).exists())
    }

    /// Reads one cell.
    pub fn get(&self, keyspace: &str, row: &str, column: &str) -> Result<Option<String>> {
        self.with_keyspace(keyspace, |conn| {
            let value = conn
                .query_row(
                    "SELECT payload FROM cells WHERE row_key = ?1 AND column_name = ?2",
                    params![row, column],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Reads all cells of a row ordered by column.
    pub fn row(&self, keyspace: &str, row: &str) -> Result<Vec<Cell>> {
        self.with_keyspace(keyspace, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_key, column_name, payload FROM cells
                 WHERE row_key = ?1 ORDER BY column_name",
            )?;
            let cells = stmt
                .query_map(params![row], read_cell)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cells)
        })
    }

    /// Reads every cell whose row key starts with `prefix`.
    pub fn scan(&self, keyspace: &str, prefix: &str) -> Result<Vec<Cell>> {
        self.with_keyspace(keyspace, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_key, column_name, payload FROM cells
                 WHERE substr(row_key, 1, length(?1)) = ?1
                 ORDER BY row_key, column_name",
            )?;
            let cells = stmt
                .query_map(params![prefix], read_cell)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cells)
        })
    }

    /// Applies all mutations in one SQLite transaction.
    pub fn apply(&self, keyspace: &str, mutations: &[Mutation]) -> Result<()> {
        self.with_keyspace(keyspace, |conn| {
            let tx = conn.transaction()?;
            for mutation in mutations {
                match mutation {
                    Mutation::Put { row, column, value } => {
                        tx.execute(
                            "INSERT INTO cells (row_key, column_name, payload) VALUES (?1, ?2, ?3)
                             ON CONFLICT(row_key, column_name) DO UPDATE SET payload = excluded.payload",
                            params![row, column, value],
                        )?;
                    }
                    Mutation::DeleteRow { row } => {
                        tx.execute("DELETE FROM cells WHERE row_key = ?1", params![row])?;
                    }
                }
            }
            tx.commit()?;
            trace!(keyspace, mutations = mutations.len(), "storage.batch.applied");
            Ok(())
        })
    }

    /// Reserves `count` consecutive values of `counter`, returning the first. Counters start at 1.
    pub fn allocate(&self, keyspace: &str, counter: &str, count: u64) -> Result<u64> {
        let step = i64::try_from(count)
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| GraphError::storage(format!("invalid allocation size {count}")))?;
        self.with_keyspace(keyspace, |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO counters (name, next) VALUES (?1, 1) ON CONFLICT(name) DO NOTHING",
                params![counter],
            )?;
            let start: i64 = tx.query_row(
                "SELECT next FROM counters WHERE name = ?1",
                params![counter],
                |r| r.get(0),
            )?;
            tx.execute(
                "UPDATE counters SET next = next + ?2 WHERE name = ?1",
                params![counter, step],
            )?;
            tx.commit()?;
            Ok(start as u64)
        })
    }

    fn keyspace_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{KEYSPACE_EXT}"))
    }

    fn connect(&self, name: &str) -> Result<Connection> {
        let conn = Connection::open(self.keyspace_path(name))?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", self.synchronous.pragma_value())?;
        conn.execute_batch(KEYSPACE_SCHEMA)?;
        Ok(conn)
    }

    fn with_keyspace<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        validate_keyspace(name)?;
        let mut open = self.open.lock();
        let conn = open
            .get_mut(name)
            .ok_or_else(|| GraphError::storage(format!("keyspace {name} does not exist")))?;
        f(conn)
    }
}

fn read_cell(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cell> {
    Ok(Cell {
        row: row.get(0)?,
        column: row.get(1)?,
        value: row.get(2)?,
    })
}

/// Keyspace names: an ASCII letter followed by up to 47 letters, digits or underscores.
pub(crate) fn validate_keyspace(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_KEYSPACE_LEN;
    if valid {
        Ok(())
    } else {
        Err(GraphError::storage(format!("invalid keyspace name '{name}'")))
    }
}
