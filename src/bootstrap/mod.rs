//! Bootstrap sequence for the artifact metadata graph.
//!
//! [`Orchestrator`] starts the storage node, opens the graph, applies the
//! schema with [`SchemaBootstrapper`], registers indexes with
//! [`IndexBuilder`], waits on them with [`IndexStatusPoller`] and runs the
//! [`DemoWorkflow`] smoke test before tearing everything down.

mod demo;
mod index;
mod orchestrator;
mod poller;
mod schema;

pub use demo::{DemoOutcome, DemoWorkflow, DEMO_PATH, DEMO_VERSION};
pub use index::IndexBuilder;
pub use orchestrator::{BootstrapReport, Orchestrator, Stage};
pub use poller::{IndexStatusPoller, IndexStatusReport, IndexStatusSource};
pub use schema::{
    ApplySummary, SchemaBootstrapper, SchemaDefinition, ARTIFACT_COORDINATES, ARTIFACT_ENTRY,
    ARTIFACT_ENTRY_COORDINATES,
};
