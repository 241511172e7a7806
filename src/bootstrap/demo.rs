use tracing::info;

use crate::error::{GraphError, Result};
use crate::graph::{GraphEngine, PropertyValue, VertexId};

use super::schema::ARTIFACT_COORDINATES;

/// Path written by the smoke test.
pub const DEMO_PATH: &str = "org/carlspring/test-artifact-1.2.3.jar";
/// Version written by the smoke test.
pub const DEMO_VERSION: &str = "1.2.3";

/// What the smoke test observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoOutcome {
    /// Id of the inserted, then discarded, vertex.
    pub vertex: VertexId,
    /// Matches for [`DEMO_PATH`] inside the writing transaction.
    pub matches_in_tx: usize,
    /// Matches for [`DEMO_PATH`] in a fresh transaction after rollback.
    pub matches_after_rollback: usize,
}

/// Writes one coordinates vertex, reads it back by path, then discards it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DemoWorkflow;

impl DemoWorkflow {
    /// Runs the smoke test against `graph`, which must hold the artifact schema.
    ///
    /// No vertex, index entry or log record survives the run. The vertex id is
    /// drawn from the keyspace's persisted id counter and is not handed back on
    /// rollback, so the counter is the one piece of state that advances.
    ///
    /// # Errors
    ///
    /// [`GraphError::SmokeTest`] when the write is not visible exactly once with
    /// the expected version, or is still visible after rollback.
    pub fn run(&self, graph: &GraphEngine) -> Result<DemoOutcome> {
        let path = PropertyValue::from(DEMO_PATH);
        let mut tx = graph.new_transaction()?;
        let vertex = tx.add_vertex(
            ARTIFACT_COORDINATES,
            [
                ("path", path.clone()),
                ("version", PropertyValue::from(DEMO_VERSION)),
            ],
        )?;
        let found = tx.has(ARTIFACT_COORDINATES, "path", &path)?;
        let matches_in_tx = found.len();
        tx.rollback();

        match found.as_slice() {
            [only] if only.property("version").and_then(PropertyValue::as_str) == Some(DEMO_VERSION) => {
                info!(%vertex, path = DEMO_PATH, version = DEMO_VERSION, "bootstrap.demo.found");
            }
            [only] => {
                return Err(GraphError::SmokeTest(format!(
                    "{DEMO_PATH} came back with version {:?}",
                    only.property("version")
                )));
            }
            _ => {
                return Err(GraphError::SmokeTest(format!(
                    "expected exactly one match for {DEMO_PATH}, found {matches_in_tx}"
                )));
            }
        }

        let verify = graph.new_transaction()?;
        let matches_after_rollback = verify.has(ARTIFACT_COORDINATES, "path", &path)?.len();
        verify.rollback();
        if matches_after_rollback != 0 {
            return Err(GraphError::SmokeTest(format!(
                "{matches_after_rollback} match(es) for {DEMO_PATH} survived rollback"
            )));
        }
        info!(%vertex, "bootstrap.demo.rolled_back");
        Ok(DemoOutcome {
            vertex,
            matches_in_tx,
            matches_after_rollback,
        })
    }
}
