use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{GraphError, Result};

use super::daemon::EmbeddedLauncher;
use super::options::StorageOptions;

const READY_PROBE_INTERVAL: Duration = Duration::from_millis(25);

/// Network location of a running storage node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Starts storage node processes.
pub trait NodeLauncher: Send {
    /// Launches a node. Failing here is a [`GraphError::Startup`]; the node need not be
    /// ready when this returns.
    fn launch(&self, opts: &StorageOptions) -> Result<Box<dyn NodeProcess>>;
}

/// A launched storage node.
pub trait NodeProcess: Send {
    /// Where the node listens.
    fn endpoint(&self) -> Endpoint;
    /// Whether the node currently answers requests.
    fn probe_ready(&self) -> bool;
    /// Why the node can never become ready, once that is known.
    fn failure(&self) -> Option<String> {
        None
    }
    /// Stops the node. Must tolerate repeated calls.
    fn shutdown(&mut self) -> Result<()>;
}

/// Owns the storage node for one bootstrap run.
///
/// `start` may be called once; `stop` any number of times, including after a
/// failed start. Dropping the manager stops the node.
pub struct StorageLifecycleManager {
    launcher: Box<dyn NodeLauncher>,
    process: Option<Box<dyn NodeProcess>>,
    started: bool,
}

impl Default for StorageLifecycleManager {
    fn default() -> Self {
        Self::new(Box::new(EmbeddedLauncher))
    }
}

impl StorageLifecycleManager {
    /// Creates a manager that launches nodes through `launcher`.
    pub fn new(launcher: Box<dyn NodeLauncher>) -> Self {
        Self {
            launcher,
            process: None,
            started: false,
        }
    }

    /// Launches the node and blocks until it is ready or `opts.startup_timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`GraphError::Lifecycle`] on a second call, [`GraphError::Startup`] when the node
    /// cannot be launched or is not ready in time. A partially started node is shut down
    /// before the error is returned; there is no retry.
    pub fn start(&mut self, opts: &StorageOptions) -> Result<Endpoint> {
        if self.started {
            return Err(GraphError::Lifecycle(
                "storage node may only be started once",
            ));
        }
        self.started = true;
        let started_at = Instant::now();
        let mut process = self.launcher.launch(opts)?;
        let endpoint = process.endpoint();
        let deadline = started_at + opts.startup_timeout;
        loop {
            if process.probe_ready() {
                info!(
                    endpoint = %endpoint,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "storage.lifecycle.ready"
                );
                self.process = Some(process);
                return Ok(endpoint);
            }
            if let Some(reason) = process.failure() {
                if let Err(err) = process.shutdown() {
                    warn!(error = %err, "storage.lifecycle.partial_shutdown_failed");
                }
                return Err(GraphError::Startup(format!(
                    "storage node at {endpoint} failed: {reason}"
                )));
            }
            let now = Instant::now();
            if now >= deadline {
                if let Err(err) = process.shutdown() {
                    warn!(error = %err, "storage.lifecycle.partial_shutdown_failed");
                }
                return Err(GraphError::Startup(format!(
                    "storage node at {endpoint} not ready after {:?}",
                    opts.startup_timeout
                )));
            }
            thread::sleep(READY_PROBE_INTERVAL.min(deadline - now));
        }
    }

    /// Whether a started node is currently owned by this manager.
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Endpoint of the running node, if any.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.process.as_ref().map(|process| process.endpoint())
    }

    /// Stops the node if one is running.
    pub fn stop(&mut self) -> Result<()> {
        match self.process.take() {
            Some(mut process) => {
                let endpoint = process.endpoint();
                process.shutdown()?;
                info!(endpoint = %endpoint, "storage.lifecycle.stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for StorageLifecycleManager {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "storage.lifecycle.drop_stop_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedNode {
        ready_after: usize,
        probes: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl NodeProcess for ScriptedNode {
        fn endpoint(&self) -> Endpoint {
            Endpoint::new("127.0.0.1", 9042)
        }

        fn probe_ready(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after
        }

        fn shutdown(&mut self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedLauncher {
        ready_after: usize,
        probes: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedLauncher {
        fn new(ready_after: usize) -> Self {
            Self {
                ready_after,
                probes: Arc::default(),
                shutdowns: Arc::default(),
            }
        }
    }

    impl NodeLauncher for ScriptedLauncher {
        fn launch(&self, _opts: &StorageOptions) -> Result<Box<dyn NodeProcess>> {
            Ok(Box::new(ScriptedNode {
                ready_after: self.ready_after,
                probes: Arc::clone(&self.probes),
                shutdowns: Arc::clone(&self.shutdowns),
            }))
        }
    }

    #[test]
    fn start_waits_for_readiness() {
        let launcher = ScriptedLauncher::new(3);
        let probes = Arc::clone(&launcher.probes);
        let mut manager = StorageLifecycleManager::new(Box::new(launcher));
        let endpoint = manager.start(&StorageOptions::default()).unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 9042));
        assert_eq!(probes.load(Ordering::SeqCst), 3);
        assert!(manager.is_running());
    }

    #[test]
    fn timeout_shuts_down_partial_node() {
        let launcher = ScriptedLauncher::new(usize::MAX);
        let shutdowns = Arc::clone(&launcher.shutdowns);
        let mut manager = StorageLifecycleManager::new(Box::new(launcher));
        let opts = StorageOptions::default().startup_timeout(Duration::from_millis(60));
        let started = Instant::now();
        let err = manager.start(&opts).unwrap_err();
        assert!(matches!(err, GraphError::Startup(_)));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(!manager.is_running());
        manager.stop().unwrap();
        manager.stop().unwrap();
    }

    #[test]
    fn second_start_is_rejected() {
        let mut manager = StorageLifecycleManager::new(Box::new(ScriptedLauncher::new(1)));
        manager.start(&StorageOptions::default()).unwrap();
        let err = manager.start(&StorageOptions::default()).unwrap_err();
        assert!(matches!(err, GraphError::Lifecycle(_)));
        assert!(manager.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let launcher = ScriptedLauncher::new(1);
        let shutdowns = Arc::clone(&launcher.shutdowns);
        let mut manager = StorageLifecycleManager::new(Box::new(launcher));
        manager.stop().unwrap();
        manager.start(&StorageOptions::default()).unwrap();
        manager.stop().unwrap();
        manager.stop().unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
