#![allow(missing_docs)]

use std::time::{Duration, Instant};

use artigraph::storage::{
    Endpoint, Mutation, NodeLauncher, NodeProcess, StorageClient, StorageLifecycleManager,
    StorageOptions,
};
use artigraph::{GraphError, Result};
use tempfile::TempDir;

const CONNECT: Duration = Duration::from_secs(2);

struct SilentNode;

impl NodeProcess for SilentNode {
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

struct SilentLauncher;

impl NodeLauncher for SilentLauncher {
    fn launch(&self, _opts: &StorageOptions) -> Result<Box<dyn NodeProcess>> {
        Ok(Box::new(SilentNode))
    }
}

#[test]
fn embedded_node_serves_after_start() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = StorageLifecycleManager::default();
    let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
    assert_ne!(endpoint.port, 0);
    assert_eq!(storage.endpoint(), Some(endpoint.clone()));

    let client = StorageClient::connect(&endpoint, CONNECT)?;
    client.ping()?;
    client.create_keyspace("jgex")?;
    client.batch("jgex", vec![Mutation::put("row", "col", "value")])?;
    assert_eq!(client.get("jgex", "row", "col")?, Some("value".to_string()));
    assert!(dir.path().join("jgex.ks").exists());
    client.close();

    storage.stop()?;
    storage.stop()?;
    assert!(!storage.is_running());
    assert!(StorageClient::connect(&endpoint, CONNECT)
        .and_then(|client| client.ping())
        .is_err());
    Ok(())
}

#[test]
fn keyspaces_survive_a_restart() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let mut storage = StorageLifecycleManager::default();
        let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
        let client = StorageClient::connect(&endpoint, CONNECT)?;
        client.create_keyspace("kept")?;
        client.batch("kept", vec![Mutation::put("a", "b", "c")])?;
        storage.stop()?;
    }
    let mut storage = StorageLifecycleManager::default();
    let endpoint = storage.start(&StorageOptions::default().data_dir(dir.path()))?;
    let client = StorageClient::connect(&endpoint, CONNECT)?;
    assert!(client.keyspace_exists("kept")?);
    assert_eq!(client.get("kept", "a", "b")?, Some("c".to_string()));
    Ok(())
}

#[test]
fn scratch_directory_is_used_without_data_dir() -> Result<()> {
    let mut storage = StorageLifecycleManager::default();
    let endpoint = storage.start(&StorageOptions::default())?;
    let client = StorageClient::connect(&endpoint, CONNECT)?;
    client.create_keyspace("scratch")?;
    assert!(client.keyspace_exists("scratch")?);
    Ok(())
}

#[test]
fn never_ready_node_fails_with_startup_error() {
    let mut storage = StorageLifecycleManager::new(Box::new(SilentLauncher));
    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let err = storage
        .start(&StorageOptions::default().startup_timeout(timeout))
        .unwrap_err();
    assert!(matches!(err, GraphError::Startup(_)), "got {err:?}");
    assert!(started.elapsed() >= timeout);
    assert!(!storage.is_running());
    storage.stop().unwrap();
}

#[test]
fn occupied_port_is_an_immediate_startup_error() -> Result<()> {
    let mut first = StorageLifecycleManager::default();
    let endpoint = first.start(&StorageOptions::default())?;

    let mut second = StorageLifecycleManager::default();
    let started = Instant::now();
    let err = second
        .start(&StorageOptions::default().port(endpoint.port))
        .unwrap_err();
    assert!(matches!(err, GraphError::Startup(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    second.stop()?;
    first.stop()?;
    Ok(())
}

#[test]
fn start_twice_is_a_lifecycle_error() -> Result<()> {
    let mut storage = StorageLifecycleManager::default();
    storage.start(&StorageOptions::default())?;
    let err = storage.start(&StorageOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::Lifecycle(_)));
    Ok(())
}

#[test]
fn corrupt_keyspace_fails_startup_without_waiting() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("broken.ks"), vec![0xA5_u8; 4096])?;

    let mut storage = StorageLifecycleManager::default();
    let started = Instant::now();
    let err = storage
        .start(
            &StorageOptions::default()
                .data_dir(dir.path())
                .startup_timeout(Duration::from_secs(30)),
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::Startup(_)), "got {err:?}");
    assert!(err.to_string().contains("recovery"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!storage.is_running());
    Ok(())
}
