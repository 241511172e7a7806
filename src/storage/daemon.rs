use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{GraphError, Result};

use super::client::StorageClient;
use super::column_store::ColumnStore;
use super::lifecycle::{Endpoint, NodeLauncher, NodeProcess};
use super::options::StorageOptions;
use super::wire::{Request, Response};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Launches [`StorageDaemon`]s in-process.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedLauncher;

impl NodeLauncher for EmbeddedLauncher {
    fn launch(&self, opts: &StorageOptions) -> Result<Box<dyn NodeProcess>> {
        Ok(Box::new(StorageDaemon::spawn(opts)?))
    }
}

/// An embedded storage node serving the wire protocol on its own tokio runtime.
///
/// The node accepts connections as soon as it is bound but answers every
/// request with an error until its warm-up pass over persisted keyspaces has
/// finished.
pub struct StorageDaemon {
    endpoint: Endpoint,
    data_dir: PathBuf,
    runtime: Option<Runtime>,
    shutdown: watch::Sender<bool>,
    ready: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    scratch: Option<TempDir>,
}

impl StorageDaemon {
    /// Binds the listener and starts serving. Readiness is reported later by
    /// [`NodeProcess::probe_ready`].
    pub fn spawn(opts: &StorageOptions) -> Result<Self> {
        let (data_dir, scratch) = match &opts.data_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("artigraph-node-")
                    .tempdir()
                    .map_err(|err| startup("failed to create scratch data directory", err))?;
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(opts.worker_threads.max(1))
            .thread_name("storage-node")
            .enable_all()
            .build()
            .map_err(|err| startup("failed to build storage runtime", err))?;
        let store = Arc::new(
            ColumnStore::open(&data_dir, opts.synchronous)
                .map_err(|err| startup("failed to open data directory", err))?,
        );
        let listener = runtime
            .block_on(TcpListener::bind((opts.host.as_str(), opts.port)))
            .map_err(|err| {
                startup(&format!("failed to bind {}:{}", opts.host, opts.port), err)
            })?;
        let local = listener
            .local_addr()
            .map_err(|err| startup("failed to read bound address", err))?;
        let endpoint = Endpoint::new(opts.host.clone(), local.port());

        let ready = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));
        let (shutdown, shutdown_rx) = watch::channel(false);
        runtime.spawn(warm_up(
            Arc::clone(&store),
            Arc::clone(&ready),
            Arc::clone(&failure),
        ));
        runtime.spawn(accept_loop(
            listener,
            store,
            Arc::clone(&ready),
            shutdown_rx,
        ));
        info!(
            endpoint = %endpoint,
            data_dir = %data_dir.display(),
            ephemeral = scratch.is_some(),
            "storage.node.bound"
        );
        Ok(Self {
            endpoint,
            data_dir,
            runtime: Some(runtime),
            shutdown,
            ready,
            failure,
            scratch,
        })
    }

    /// Directory holding this node's keyspace files.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}

impl NodeProcess for StorageDaemon {
    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn probe_ready(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            return false;
        }
        match StorageClient::connect(&self.endpoint, PROBE_TIMEOUT).and_then(|c| c.ping()) {
            Ok(()) => true,
            Err(err) => {
                debug!(endpoint = %self.endpoint, error = %err, "storage.node.probe_failed");
                false
            }
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };
        let _ = self.shutdown.send(true);
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
        self.ready.store(false, Ordering::Release);
        if let Some(scratch) = self.scratch.take() {
            scratch.close()?;
        }
        info!(endpoint = %self.endpoint, "storage.node.stopped");
        Ok(())
    }
}

impl Drop for StorageDaemon {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "storage.node.drop_shutdown_failed");
        }
    }
}

fn startup(context: &str, err: impl std::fmt::Display) -> GraphError {
    GraphError::Startup(format!("{context}: {err}"))
}

async fn warm_up(
    store: Arc<ColumnStore>,
    ready: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
) {
    let recovered = tokio::task::spawn_blocking(move || store.recover()).await;
    let reason = match recovered {
        Ok(Ok(keyspaces)) => {
            ready.store(true, Ordering::Release);
            info!(keyspaces, "storage.node.ready");
            return;
        }
        Ok(Err(err)) => format!("keyspace recovery failed: {err}"),
        Err(err) => format!("keyspace recovery panicked: {err}"),
    };
    error!(reason = %reason, "storage.node.warm_up_failed");
    *failure.lock() = Some(reason);
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<ColumnStore>,
    ready: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("storage.node.accept_loop_exit");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "storage.node.connection_opened");
                    let store = Arc::clone(&store);
                    let ready = Arc::clone(&ready);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, store, ready).await {
                            debug!(%peer, error = %err, "storage.node.connection_error");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "storage.node.accept_failed"),
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    store: Arc<ColumnStore>,
    ready: Arc<AtomicBool>,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(_) if !ready.load(Ordering::Acquire) => Response::Error {
                message: "storage node is still bootstrapping".to_string(),
            },
            Ok(request) => {
                let store = Arc::clone(&store);
                tokio::task::spawn_blocking(move || store.handle(request))
                    .await
                    .unwrap_or_else(|err| Response::Error {
                        message: format!("request handler failed: {err}"),
                    })
            }
            Err(err) => Response::Error {
                message: format!("malformed request: {err}"),
            },
        };
        let mut payload = serde_json::to_vec(&response).map_err(io::Error::other)?;
        payload.push(b'\n');
        write.write_all(&payload).await?;
    }
    Ok(())
}
