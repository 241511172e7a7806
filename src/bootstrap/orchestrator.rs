use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::BootstrapConfig;
use crate::error::{GraphError, Result};
use crate::graph::{GraphEngineManager, GraphHandle};
use crate::storage::{Endpoint, NodeLauncher, StorageLifecycleManager};

use super::demo::{DemoOutcome, DemoWorkflow};
use super::index::IndexBuilder;
use super::poller::{IndexStatusPoller, IndexStatusReport};
use super::schema::{ApplySummary, SchemaBootstrapper, SchemaDefinition};

/// Bootstrap steps, in the order they complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Storage node is ready.
    StorageStarted,
    /// Graph is open.
    GraphOpened,
    /// Schema transaction committed.
    SchemaApplied,
    /// Index transaction committed.
    IndexesBuilt,
    /// Every index is enabled.
    IndexesEnabled,
    /// Smoke test passed.
    DemoCompleted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::StorageStarted => "storage_started",
            Stage::GraphOpened => "graph_opened",
            Stage::SchemaApplied => "schema_applied",
            Stage::IndexesBuilt => "indexes_built",
            Stage::IndexesEnabled => "indexes_enabled",
            Stage::DemoCompleted => "demo_completed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Clone, Debug)]
pub struct BootstrapReport {
    /// Where the storage node listened.
    pub endpoint: Endpoint,
    /// Keyspace that held the graph.
    pub keyspace: String,
    /// Schema definitions created or found.
    pub schema: ApplySummary,
    /// Index convergence.
    pub indexes: IndexStatusReport,
    /// Smoke test result.
    pub demo: DemoOutcome,
}

/// Runs the bootstrap sequence and tears it down.
///
/// Steps run in order and stop at the first failure. Teardown always runs
/// afterwards: the graph is dropped, then the storage node is stopped. The
/// graph is closed instead when the keyspace is kept, or when the run failed
/// on index convergence so the indexes stay on disk for inspection. Teardown failures are logged and kept
/// for inspection but never replace the error that stopped the run.
pub struct Orchestrator {
    config: BootstrapConfig,
    storage: StorageLifecycleManager,
    graphs: GraphEngineManager,
    graph: Option<GraphHandle>,
    stages: Vec<Stage>,
    teardown_errors: Vec<GraphError>,
    retain_keyspace: bool,
}

impl Orchestrator {
    /// Orchestrator with an in-process storage node.
    pub fn new(config: BootstrapConfig) -> Self {
        Self::with_parts(config, StorageLifecycleManager::default())
    }

    /// Orchestrator whose storage node is started by `launcher`.
    pub fn with_launcher(config: BootstrapConfig, launcher: Box<dyn NodeLauncher>) -> Self {
        Self::with_parts(config, StorageLifecycleManager::new(launcher))
    }

    fn with_parts(config: BootstrapConfig, storage: StorageLifecycleManager) -> Self {
        let graphs =
            GraphEngineManager::new().with_lifecycle_interval(config.lifecycle_interval());
        Self {
            config,
            storage,
            graphs,
            graph: None,
            stages: Vec::new(),
            teardown_errors: Vec::new(),
            retain_keyspace: false,
        }
    }

    /// Runs every step, then tears down. Returns the first failure.
    pub fn run(&mut self) -> Result<BootstrapReport> {
        let outcome = self.start();
        if let Err(err) = &outcome {
            error!(
                error = %err,
                completed = ?self.stages,
                "bootstrap.failed"
            );
            if matches!(
                err,
                GraphError::IndexBuild { .. } | GraphError::IndexBuildTimeout { .. }
            ) {
                self.retain_keyspace = true;
            }
        }
        self.teardown();
        outcome
    }

    /// Steps completed so far.
    pub fn completed_stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Failures recorded during teardown.
    pub fn teardown_errors(&self) -> &[GraphError] {
        &self.teardown_errors
    }

    /// The open graph, between a successful open and teardown.
    pub fn graph(&self) -> Option<&GraphHandle> {
        self.graph.as_ref()
    }

    fn start(&mut self) -> Result<BootstrapReport> {
        let endpoint = self.storage.start(&self.config.storage_options())?;
        self.complete(Stage::StorageStarted);

        let extra = self.config.extra_graph_options()?;
        let graph = self.graphs.open(
            &endpoint,
            &self.config.graph.keyspace,
            self.config.graph.tx_log,
            &extra,
        )?;
        self.graph = Some(Arc::clone(&graph));
        self.complete(Stage::GraphOpened);

        let mut tx = graph.management()?;
        let defs = SchemaDefinition::artifact_metadata();
        let schema = match SchemaBootstrapper.apply(&mut tx, &defs) {
            Ok(summary) => {
                tx.commit()?;
                summary
            }
            Err(err) => {
                tx.rollback();
                return Err(err);
            }
        };
        self.complete(Stage::SchemaApplied);

        let mut tx = graph.management()?;
        let names = match IndexBuilder.build(&mut tx, &SchemaDefinition::artifact_indexes()) {
            Ok(names) => {
                tx.commit()?;
                names
            }
            Err(err) => {
                tx.rollback();
                return Err(err);
            }
        };
        self.complete(Stage::IndexesBuilt);

        let poller =
            IndexStatusPoller::new(self.config.poll_interval(), self.config.index_timeout());
        let indexes = poller.await_enabled(graph.as_ref(), &names)?;
        self.complete(Stage::IndexesEnabled);

        let rendered = graph.schema()?.render();
        info!(keyspace = graph.keyspace(), schema = %rendered, "bootstrap.schema.current");

        let demo = DemoWorkflow.run(&graph)?;
        self.complete(Stage::DemoCompleted);

        Ok(BootstrapReport {
            endpoint,
            keyspace: graph.keyspace().to_string(),
            schema,
            indexes,
            demo,
        })
    }

    /// Releases the graph and the storage node. Safe to call repeatedly and
    /// after a failure at any step.
    pub fn teardown(&mut self) {
        if let Some(graph) = self.graph.take() {
            let open = graph.open_transactions();
            if open > 0 {
                warn!(open, "bootstrap.teardown.open_transactions");
            }
            if self.retain_keyspace {
                warn!(
                    keyspace = graph.keyspace(),
                    data_dir = ?self.config.storage.data_dir,
                    "bootstrap.teardown.keyspace_retained"
                );
            }
            let (step, result) = if self.config.graph.keep_keyspace || self.retain_keyspace {
                ("close_graph", self.graphs.close(&graph))
            } else {
                ("drop_graph", self.graphs.drop_graph(&graph))
            };
            if let Err(err) = result {
                self.record_teardown(step, err);
            }
        }
        if let Err(err) = self.storage.stop() {
            self.record_teardown("stop_storage", err);
        }
    }

    fn complete(&mut self, stage: Stage) {
        info!(%stage, "bootstrap.stage");
        self.stages.push(stage);
    }

    fn record_teardown(&mut self, step: &'static str, err: GraphError) {
        let err = GraphError::Teardown {
            step,
            message: err.to_string(),
        };
        warn!(error = %err, "bootstrap.teardown.step_failed");
        self.teardown_errors.push(err);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}
