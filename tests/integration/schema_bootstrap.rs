#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::time::Duration;

use artigraph::bootstrap::{
    DemoWorkflow, IndexBuilder, IndexStatusPoller, SchemaBootstrapper, SchemaDefinition,
    ARTIFACT_COORDINATES, DEMO_PATH,
};
use artigraph::graph::{
    GraphEngineManager, GraphHandle, IndexDef, IndexStatus, PropertyKeyDef, PropertyValue,
    ScalarKind, VertexLabelDef,
};
use artigraph::storage::{StorageLifecycleManager, StorageOptions};
use artigraph::{GraphError, Result};
use tempfile::TempDir;

struct Harness {
    graph: GraphHandle,
    storage: StorageLifecycleManager,
    _dir: TempDir,
}

impl Harness {
    fn open(keyspace: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let mut storage = StorageLifecycleManager::default();
        let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
        let graph = GraphEngineManager::new()
            .with_lifecycle_interval(Duration::from_millis(20))
            .open(&endpoint, keyspace, true, &[])?;
        Ok(Self {
            graph,
            storage,
            _dir: dir,
        })
    }

    fn apply(&self, defs: &SchemaDefinition) -> Result<usize> {
        let mut tx = self.graph.management()?;
        SchemaBootstrapper.apply(&mut tx, defs)?;
        tx.commit()
    }

    fn build(&self, defs: &[IndexDef]) -> Result<BTreeSet<String>> {
        let mut tx = self.graph.management()?;
        let names = IndexBuilder.build(&mut tx, defs)?;
        tx.commit()?;
        Ok(names)
    }

    fn await_enabled(&self, names: &BTreeSet<String>) -> Result<()> {
        IndexStatusPoller::new(Duration::from_millis(10), Duration::from_secs(10))
            .await_enabled(self.graph.as_ref(), names)
            .map(|_| ())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.graph.drop_graph();
        let _ = self.storage.stop();
    }
}

fn coordinates_schema() -> SchemaDefinition {
    SchemaDefinition {
        property_keys: vec![
            PropertyKeyDef::new("path", ScalarKind::String),
            PropertyKeyDef::new("version", ScalarKind::String),
        ],
        vertex_labels: vec![VertexLabelDef::new(ARTIFACT_COORDINATES)],
        edge_labels: Vec::new(),
    }
}

fn path_index() -> Vec<IndexDef> {
    vec![IndexDef::composite(ARTIFACT_COORDINATES, ["path"])]
}

fn by_path(harness: &Harness, path: &str) -> Result<Vec<artigraph::graph::Vertex>> {
    let tx = harness.graph.new_transaction()?;
    tx.has(ARTIFACT_COORDINATES, "path", &PropertyValue::from(path))
}

#[test]
fn indexed_write_is_readable_by_path() -> Result<()> {
    let harness = Harness::open("scenario_one")?;
    harness.apply(&coordinates_schema())?;
    let names = harness.build(&path_index())?;
    assert_eq!(names, BTreeSet::from(["ArtifactCoordinates.path".to_string()]));
    harness.await_enabled(&names)?;
    assert_eq!(
        harness.graph.index_status("ArtifactCoordinates.path")?,
        Some(IndexStatus::Enabled)
    );

    let mut tx = harness.graph.new_transaction()?;
    tx.add_vertex(
        ARTIFACT_COORDINATES,
        [
            ("path", PropertyValue::from(DEMO_PATH)),
            ("version", PropertyValue::from("1.2.3")),
        ],
    )?;
    tx.commit()?;

    let found = by_path(&harness, DEMO_PATH)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].property("version"), Some(&PropertyValue::from("1.2.3")));
    Ok(())
}

#[test]
fn applying_twice_changes_nothing() -> Result<()> {
    let harness = Harness::open("idempotent")?;
    let defs = SchemaDefinition::artifact_metadata();
    assert_eq!(harness.apply(&defs)?, defs.len());
    let first = harness.graph.schema()?;

    let mut tx = harness.graph.management()?;
    let summary = SchemaBootstrapper.apply(&mut tx, &defs)?;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.existing, defs.len());
    assert_eq!(tx.commit()?, 0);

    let second = harness.graph.schema()?;
    assert_eq!(first, second);
    assert_eq!(second.property_keys().count(), 8);
    Ok(())
}

#[test]
fn index_over_unknown_key_fails_before_commit() -> Result<()> {
    let harness = Harness::open("unknown_key")?;
    harness.apply(&coordinates_schema())?;

    let mut tx = harness.graph.management()?;
    let defs = vec![
        IndexDef::composite(ARTIFACT_COORDINATES, ["path"]),
        IndexDef::composite(ARTIFACT_COORDINATES, ["nonexistent"]),
    ];
    let err = IndexBuilder.build(&mut tx, &defs).unwrap_err();
    assert!(matches!(err, GraphError::Schema(_)), "got {err:?}");
    assert_eq!(tx.pending(), 0);
    tx.rollback();

    let schema = harness.graph.schema()?;
    assert_eq!(schema.indexes().count(), 0);
    assert_eq!(harness.graph.index_status("ArtifactCoordinates.path")?, None);
    Ok(())
}

#[test]
fn conflicting_definition_is_rejected_and_rolled_back() -> Result<()> {
    let harness = Harness::open("conflict")?;
    harness.apply(&coordinates_schema())?;

    let mut defs = coordinates_schema();
    defs.property_keys.push(PropertyKeyDef::new("sizeInBytes", ScalarKind::Int64));
    defs.property_keys[0] = PropertyKeyDef::new("path", ScalarKind::Int64);
    let mut tx = harness.graph.management()?;
    let err = SchemaBootstrapper.apply(&mut tx, &defs).unwrap_err();
    assert!(matches!(err, GraphError::Schema(_)));
    tx.rollback();

    let schema = harness.graph.schema()?;
    assert_eq!(
        schema.property_key("path").map(|key| key.kind),
        Some(ScalarKind::String)
    );
    assert!(schema.property_key("sizeInBytes").is_none());
    Ok(())
}

#[test]
fn index_needs_committed_schema() -> Result<()> {
    let harness = Harness::open("same_tx")?;
    let mut tx = harness.graph.management()?;
    SchemaBootstrapper.apply(&mut tx, &coordinates_schema())?;
    let err = IndexBuilder.build(&mut tx, &path_index()).unwrap_err();
    assert!(matches!(err, GraphError::Schema(_)));
    Ok(())
}

#[test]
fn mixed_indexes_and_duplicate_keys_are_schema_errors() -> Result<()> {
    let harness = Harness::open("mixed")?;
    harness.apply(&coordinates_schema())?;
    let mut tx = harness.graph.management()?;
    let mixed = IndexBuilder
        .build(&mut tx, &[IndexDef::mixed(ARTIFACT_COORDINATES, ["path"])])
        .unwrap_err();
    assert!(matches!(mixed, GraphError::Schema(_)));
    let duplicate = IndexBuilder
        .build(
            &mut tx,
            &[IndexDef::composite(ARTIFACT_COORDINATES, ["path", "path"])],
        )
        .unwrap_err();
    assert!(matches!(duplicate, GraphError::Schema(_)));
    Ok(())
}

#[test]
fn rebuilding_an_existing_index_returns_its_name() -> Result<()> {
    let harness = Harness::open("rebuild")?;
    harness.apply(&coordinates_schema())?;
    let first = harness.build(&path_index())?;
    harness.await_enabled(&first)?;
    let second = harness.build(&path_index())?;
    assert_eq!(first, second);
    harness.await_enabled(&second)?;
    Ok(())
}

#[test]
fn index_lookups_return_exactly_the_matching_vertices() -> Result<()> {
    let harness = Harness::open("read_after_build")?;
    harness.apply(&coordinates_schema())?;

    // Committed before the index exists; reachable only through backfill.
    let mut tx = harness.graph.new_transaction()?;
    for (path, version) in [("a.jar", "1"), ("b.jar", "1"), ("a.jar", "2")] {
        tx.add_vertex(
            ARTIFACT_COORDINATES,
            [
                ("path", PropertyValue::from(path)),
                ("version", PropertyValue::from(version)),
            ],
        )?;
    }
    tx.commit()?;

    let names = harness.build(&path_index())?;
    harness.await_enabled(&names)?;

    let mut tx = harness.graph.new_transaction()?;
    tx.add_vertex(ARTIFACT_COORDINATES, [("path", PropertyValue::from("a.jar"))])?;
    tx.commit()?;

    let hits = by_path(&harness, "a.jar")?;
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|v| v.property("path") == Some(&PropertyValue::from("a.jar"))));
    assert_eq!(by_path(&harness, "b.jar")?.len(), 1);
    assert!(by_path(&harness, "c.jar")?.is_empty());
    Ok(())
}

#[test]
fn demo_rolls_back_its_write() -> Result<()> {
    let harness = Harness::open("scenario_six")?;
    harness.apply(&SchemaDefinition::artifact_metadata())?;
    let names = harness.build(&SchemaDefinition::artifact_indexes())?;
    harness.await_enabled(&names)?;

    let outcome = DemoWorkflow.run(&harness.graph)?;
    assert_eq!(outcome.matches_in_tx, 1);
    assert_eq!(outcome.matches_after_rollback, 0);
    assert!(by_path(&harness, DEMO_PATH)?.is_empty());
    assert_eq!(harness.graph.open_transactions(), 0);
    Ok(())
}

#[test]
fn poller_rejects_unknown_index_names() -> Result<()> {
    let harness = Harness::open("poll_unknown")?;
    let err = harness
        .await_enabled(&BTreeSet::from(["Missing.key".to_string()]))
        .unwrap_err();
    assert!(matches!(err, GraphError::Schema(_)));
    Ok(())
}

#[test]
fn poller_with_empty_set_returns_immediately() -> Result<()> {
    let harness = Harness::open("poll_empty")?;
    let report = IndexStatusPoller::new(Duration::from_secs(1), Duration::from_secs(1))
        .await_enabled(harness.graph.as_ref(), &BTreeSet::new())?;
    assert_eq!(report.polls, 0);
    assert!(report.elapsed < Duration::from_secs(1));
    Ok(())
}
