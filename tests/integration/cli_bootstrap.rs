#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("bootstrap.toml");
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn bootstrap_exits_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir, "[index]\npoll_interval_ms = 10\n");
    let data = dir.path().join("data");

    cargo_bin_cmd!("artigraph")
        .env_remove("ARTIGRAPH_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .args(["--keyspace", "cli_smoke"])
        .assert()
        .success();

    assert!(data.is_dir());
    assert!(!data.join("cli_smoke.ks").exists());
}

#[test]
fn keep_keyspace_flag_leaves_data_behind() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir, "");
    let data = dir.path().join("data");

    cargo_bin_cmd!("artigraph")
        .env("ARTIGRAPH_CONFIG", &config)
        .arg("--data-dir")
        .arg(&data)
        .arg("--keep-keyspace")
        .assert()
        .success();

    assert!(data.join("jgex.ks").exists());
}

#[test]
fn unknown_graph_option_fails_with_config_status() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir, "[graph.options]\n\"storage.cql.keyspace\" = \"other\"\n");

    cargo_bin_cmd!("artigraph")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(6);
}

#[test]
fn missing_config_file_fails() {
    let dir = TempDir::new().expect("tempdir");

    cargo_bin_cmd!("artigraph")
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .code(6);
}

#[test]
fn invalid_keyspace_name_fails() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir, "");

    cargo_bin_cmd!("artigraph")
        .arg("--config")
        .arg(&config)
        .args(["--keyspace", "not a keyspace"])
        .assert()
        .failure()
        .code(6);
}
