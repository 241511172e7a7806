use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::{GraphEngine, IndexStatus};

/// Anything that can report index statuses.
pub trait IndexStatusSource {
    /// Status of index `name`, `None` when it does not exist.
    fn index_status(&self, name: &str) -> Result<Option<IndexStatus>>;
}

impl IndexStatusSource for GraphEngine {
    fn index_status(&self, name: &str) -> Result<Option<IndexStatus>> {
        GraphEngine::index_status(self, name)
    }
}

/// Result of a successful wait.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStatusReport {
    /// Final status of each awaited index.
    pub statuses: BTreeMap<String, IndexStatus>,
    /// Polling rounds issued.
    pub polls: usize,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Blocks until indexes are queryable.
#[derive(Clone, Copy, Debug)]
pub struct IndexStatusPoller {
    poll_interval: Duration,
    timeout: Duration,
}

impl IndexStatusPoller {
    /// Poller that checks every `poll_interval` and gives up after `timeout`.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Waits until every index in `names` is `enabled`.
    ///
    /// Each round queries every index not yet enabled, then sleeps for the poll
    /// interval. An empty set succeeds at once without querying.
    ///
    /// # Errors
    ///
    /// [`GraphError::IndexBuild`] as soon as any index reports `disabled`,
    /// [`GraphError::Schema`] for a name with no index, and
    /// [`GraphError::IndexBuildTimeout`] when the deadline passes first. Indexes
    /// are left as they are in every case.
    pub fn await_enabled<S>(&self, source: &S, names: &BTreeSet<String>) -> Result<IndexStatusReport>
    where
        S: IndexStatusSource + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut report = IndexStatusReport::default();
        let mut pending: BTreeSet<String> = names.clone();
        while !pending.is_empty() {
            report.polls += 1;
            let mut enabled = Vec::new();
            for name in &pending {
                let status = source.index_status(name)?.ok_or_else(|| {
                    GraphError::schema(format!("index {name} does not exist"))
                })?;
                report.statuses.insert(name.clone(), status);
                match status {
                    IndexStatus::Enabled => enabled.push(name.clone()),
                    IndexStatus::Disabled => {
                        warn!(index = %name, polls = report.polls, "bootstrap.index.disabled");
                        return Err(GraphError::IndexBuild {
                            index: name.clone(),
                        });
                    }
                    IndexStatus::Installed | IndexStatus::Registered => {}
                }
            }
            for name in enabled {
                pending.remove(&name);
            }
            if pending.is_empty() {
                break;
            }
            debug!(round = report.polls, pending = pending.len(), "bootstrap.index.waiting");
            let now = Instant::now();
            if now >= deadline {
                let waited = started.elapsed();
                warn!(?pending, waited_ms = waited.as_millis() as u64, "bootstrap.index.timeout");
                return Err(GraphError::IndexBuildTimeout {
                    pending: pending.into_iter().collect(),
                    waited,
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
        report.elapsed = started.elapsed();
        info!(
            indexes = report.statuses.len(),
            polls = report.polls,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "bootstrap.index.enabled"
        );
        Ok(report)
    }
}
