#![allow(missing_docs)]

use std::time::{Duration, Instant};

use artigraph::bootstrap::{Orchestrator, Stage, DEMO_PATH};
use artigraph::graph::{GraphEngineManager, IndexStatus};
use artigraph::storage::{
    Endpoint, Mutation, NodeLauncher, NodeProcess, StorageClient, StorageLifecycleManager,
    StorageOptions,
};
use artigraph::{BootstrapConfig, GraphError, Result};
use tempfile::TempDir;

struct UnresponsiveNode;

impl NodeProcess for UnresponsiveNode {
    fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", 1)
    }

    fn probe_ready(&self) -> bool {
        false
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

struct UnresponsiveLauncher;

impl NodeLauncher for UnresponsiveLauncher {
    fn launch(&self, _opts: &StorageOptions) -> Result<Box<dyn NodeProcess>> {
        Ok(Box::new(UnresponsiveNode))
    }
}

fn config_in(dir: &TempDir, extra: &str) -> BootstrapConfig {
    let toml = format!(
        "[storage]\ndata_dir = {:?}\nstartup_timeout_ms = 10000\n\n[index]\npoll_interval_ms = 10\ntimeout_ms = 10000\n{extra}",
        dir.path().display().to_string()
    );
    BootstrapConfig::from_toml_str(&toml).unwrap()
}

#[test]
fn full_run_completes_and_drops_the_keyspace() -> Result<()> {
    let dir = TempDir::new()?;
    let mut orchestrator = Orchestrator::new(config_in(&dir, ""));
    let report = orchestrator.run()?;

    assert_eq!(
        orchestrator.completed_stages(),
        &[
            Stage::StorageStarted,
            Stage::GraphOpened,
            Stage::SchemaApplied,
            Stage::IndexesBuilt,
            Stage::IndexesEnabled,
            Stage::DemoCompleted,
        ]
    );
    assert_eq!(report.keyspace, "jgex");
    assert_eq!(report.schema.created, 11);
    assert_eq!(report.schema.existing, 0);
    assert!(report.indexes.polls >= 1);
    assert_eq!(report.demo.matches_in_tx, 1);
    assert_eq!(report.demo.matches_after_rollback, 0);
    assert!(orchestrator.teardown_errors().is_empty());
    assert!(orchestrator.graph().is_none());
    assert!(!dir.path().join("jgex.ks").exists());
    Ok(())
}

#[test]
fn kept_keyspace_is_reused_by_the_next_run() -> Result<()> {
    let dir = TempDir::new()?;
    let keep = "[graph]\nkeep_keyspace = true\n";

    let mut first = Orchestrator::new(config_in(&dir, keep));
    let report = first.run()?;
    assert_eq!(report.schema.created, 11);
    assert!(dir.path().join("jgex.ks").exists());
    drop(first);

    let mut second = Orchestrator::new(config_in(&dir, ""));
    let report = second.run()?;
    assert_eq!(report.schema.created, 0);
    assert_eq!(report.schema.existing, 11);
    assert_eq!(report.indexes.polls, 1);
    assert!(second.teardown_errors().is_empty());
    assert!(!dir.path().join("jgex.ks").exists());
    Ok(())
}

#[test]
fn unready_storage_stops_before_the_graph_opens() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "");
    config.storage.startup_timeout_ms = 200;
    let mut orchestrator = Orchestrator::with_launcher(config, Box::new(UnresponsiveLauncher));

    let started = Instant::now();
    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, GraphError::Startup(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 2);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(orchestrator.completed_stages().is_empty());
    assert!(orchestrator.graph().is_none());
    assert!(orchestrator.teardown_errors().is_empty());
}

#[test]
fn rejected_graph_option_tears_storage_down() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "[graph.options]\n\"cache.db-cache\" = true\n");
    let mut orchestrator = Orchestrator::new(config);
    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, GraphError::Config(_)), "got {err:?}");
    assert_eq!(orchestrator.completed_stages(), &[Stage::StorageStarted]);
    assert!(orchestrator.teardown_errors().is_empty());
}

#[test]
fn teardown_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let mut orchestrator = Orchestrator::new(config_in(&dir, ""));
    orchestrator.run()?;
    orchestrator.teardown();
    orchestrator.teardown();
    assert!(orchestrator.teardown_errors().is_empty());
    Ok(())
}

#[test]
fn demo_vertex_never_persists() -> Result<()> {
    let dir = TempDir::new()?;
    let mut orchestrator = Orchestrator::new(config_in(&dir, "[graph]\nkeep_keyspace = true\n"));
    orchestrator.run()?;
    drop(orchestrator);

    let ks = std::fs::read(dir.path().join("jgex.ks"))?;
    let needle = DEMO_PATH.as_bytes();
    assert!(!ks.windows(needle.len()).any(|window| window == needle));
    Ok(())
}

const INDEX_FAILURE_STAGES: [Stage; 4] = [
    Stage::StorageStarted,
    Stage::GraphOpened,
    Stage::SchemaApplied,
    Stage::IndexesBuilt,
];

#[test]
fn index_timeout_keeps_the_keyspace_for_inspection() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(&dir, "");
    config.index.poll_interval_ms = 10;
    config.index.timeout_ms = 10;
    config.graph.lifecycle_interval_ms = 600_000;
    let mut orchestrator = Orchestrator::new(config);

    let err = orchestrator.run().unwrap_err();
    let GraphError::IndexBuildTimeout { pending, .. } = &err else {
        panic!("expected an index timeout, got {err:?}");
    };
    assert_eq!(pending, &["ArtifactCoordinates.path".to_string()]);
    assert_eq!(err.exit_code(), 4);
    assert_eq!(orchestrator.completed_stages(), &INDEX_FAILURE_STAGES);
    assert!(orchestrator.teardown_errors().is_empty());
    assert!(orchestrator.graph().is_none());
    drop(orchestrator);
    assert!(dir.path().join("jgex.ks").exists());

    let mut storage = StorageLifecycleManager::default();
    let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
    let graph = GraphEngineManager::new()
        .with_lifecycle_interval(Duration::from_secs(600))
        .open(&endpoint, "jgex", false, &[])?;
    let status = graph.index_status("ArtifactCoordinates.path")?;
    assert!(
        matches!(status, Some(IndexStatus::Installed | IndexStatus::Registered)),
        "got {status:?}"
    );
    graph.close()?;
    storage.stop()?;
    Ok(())
}

#[test]
fn disabled_index_fails_the_run_and_keeps_the_keyspace() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let mut storage = StorageLifecycleManager::default();
        let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
        let client = StorageClient::connect(&endpoint, Duration::from_secs(2))?;
        client.create_keyspace("jgex")?;
        let row = "vertex.00000000000000000042";
        client.batch(
            "jgex",
            vec![
                Mutation::put(row, "~label", "ArtifactCoordinates"),
                Mutation::put(row, "p.path", "{truncated"),
            ],
        )?;
        client.close();
        storage.stop()?;
    }

    let mut orchestrator = Orchestrator::new(config_in(&dir, ""));
    let err = orchestrator.run().unwrap_err();
    assert!(
        matches!(&err, GraphError::IndexBuild { index } if index == "ArtifactCoordinates.path"),
        "got {err:?}"
    );
    assert_eq!(err.exit_code(), 4);
    assert_eq!(orchestrator.completed_stages(), &INDEX_FAILURE_STAGES);
    assert!(orchestrator.teardown_errors().is_empty());
    drop(orchestrator);
    assert!(dir.path().join("jgex.ks").exists());
    Ok(())
}

#[test]
fn report_names_the_keyspace_the_graph_opened() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(
        &dir,
        "[graph]\nkeep_keyspace = true\n\n[graph.options]\n\"storage.keyspace\" = \"overridden\"\n",
    );
    let mut orchestrator = Orchestrator::new(config);
    let report = orchestrator.run()?;
    assert_eq!(report.keyspace, "overridden");
    drop(orchestrator);
    assert!(dir.path().join("overridden.ks").exists());
    assert!(!dir.path().join("jgex.ks").exists());
    Ok(())
}
