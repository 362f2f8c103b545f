//! End-to-end tests of the `vmirror` binary against a temporary database
//! and JSON inventory dumps.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vmirror_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vmirror");
    path
}

const DUMP: &str = r#"{
  "vms": [
    { "moid": "vm-1", "name": "web01", "cluster": "prod", "host": "esx01", "power_state": "poweredOn" },
    { "moid": "vm-2", "name": "web02", "cluster": "prod", "host": "esx01", "power_state": "poweredOn" },
    { "moid": "vm-3", "name": "old01", "cluster": "dev", "host": "esx02", "power_state": "poweredOff" }
  ],
  "hosts": [
    { "moid": "host-1", "name": "esx01", "cluster": "prod", "vm_count": 2 },
    { "moid": "host-2", "name": "esx02", "cluster": "dev", "vm_count": 1 },
    { "moid": "host-3", "name": "esx03", "cluster": "dev", "vm_count": 0 }
  ],
  "datastores": [
    { "moid": "ds-1", "name": "san-a", "datastore_type": "VMFS", "vm_count": 3 },
    { "moid": "ds-2", "name": "scratch", "datastore_type": "NFS", "vm_count": 0 }
  ],
  "clusters": [
    { "moid": "domain-c1", "name": "prod", "num_hosts": 1, "num_vms": 2 },
    { "moid": "domain-c2", "name": "dev", "num_hosts": 2, "num_vms": 1 }
  ],
  "snapshots": {
    "vm-3": { "nodes": [{ "moid": "snap-1", "name": "before-upgrade" }] }
  }
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let dumps_dir = root.join("dumps");
    fs::create_dir_all(&dumps_dir).unwrap();
    fs::write(dumps_dir.join("vc01.json"), DUMP).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/inventory.sqlite"

[sync]
max_workers = 2

[log]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("vmirror.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vmirror(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vmirror_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vmirror binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn add_dump_source(tmp: &TempDir, config: &Path, hostname: &str, dump: &str) {
    let endpoint = tmp.path().join("dumps").join(dump);
    let (stdout, stderr, ok) = run_vmirror(
        config,
        &["source", "add", hostname, "--endpoint", endpoint.to_str().unwrap()],
    );
    assert!(ok, "source add failed: {}", stderr);
    assert!(stdout.contains("Added source"), "stdout: {}", stdout);
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_vmirror(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));

    let (_, stderr, ok) = run_vmirror(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_sync_status_and_query() {
    let (tmp, config) = setup_test_env();
    run_vmirror(&config, &["init"]);
    add_dump_source(&tmp, &config, "vc01.lab", "vc01.json");

    let (stdout, stderr, ok) = run_vmirror(&config, &["sync", "1"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("ok"));

    let (stdout, _, ok) = run_vmirror(&config, &["status", "1"]);
    assert!(ok);
    assert!(stdout.contains("vc01.lab"));
    assert!(stdout.contains("completed"));

    let (stdout, stderr, ok) = run_vmirror(
        &config,
        &["query", "--json", "how many powered on vms in cluster prod"],
    );
    assert!(ok, "query failed: {}", stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["entity_type"], "vm");
    assert_eq!(result["action"], "count");
    assert_eq!(result["count"], 2);
    assert_eq!(result["filters"]["power_state"], "poweredOn");
    assert_eq!(result["filters"]["cluster"], "prod");
    assert!(result.get("data").is_none());

    let (stdout, _, ok) = run_vmirror(&config, &["query", "--json", "list empty datastores"]);
    assert!(ok);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(result["data"][0]["name"], "scratch");
    assert_eq!(result["data"][0]["type"], "NFS");

    let (stdout, _, ok) = run_vmirror(&config, &["query", "show hosts with no vms"]);
    assert!(ok);
    assert!(stdout.contains("esx03"));
    assert!(!stdout.contains("esx01"));
}

#[test]
fn test_failed_source_exits_nonzero_and_keeps_status() {
    let (tmp, config) = setup_test_env();
    run_vmirror(&config, &["init"]);
    add_dump_source(&tmp, &config, "vc01.lab", "vc01.json");
    add_dump_source(&tmp, &config, "vc02.lab", "missing.json");

    let (stdout, _, ok) = run_vmirror(&config, &["sync", "all"]);
    assert!(!ok, "batch with a failed source must exit non-zero");
    assert!(stdout.contains("1 succeeded, 1 failed"), "stdout: {}", stdout);

    let (stdout, _, ok) = run_vmirror(&config, &["status", "2"]);
    assert!(ok);
    assert!(stdout.contains("failed"));
    assert!(stdout.contains("missing.json"));

    let (_, _, ok) = run_vmirror(&config, &["sync", "2"]);
    assert!(!ok);
}

#[test]
fn test_disabled_source_is_skipped_by_sync_all() {
    let (tmp, config) = setup_test_env();
    run_vmirror(&config, &["init"]);
    add_dump_source(&tmp, &config, "vc01.lab", "vc01.json");

    let (_, stderr, ok) = run_vmirror(&config, &["source", "disable", "1"]);
    assert!(ok, "disable failed: {}", stderr);

    let (stdout, _, ok) = run_vmirror(&config, &["sync", "all"]);
    assert!(ok);
    assert!(stdout.contains("No active sources to sync"));

    let (stdout, _, ok) = run_vmirror(&config, &["source", "list"]);
    assert!(ok);
    assert!(stdout.contains("vc01.lab"));
    assert!(stdout.contains("pending"));
}

#[test]
fn test_unknown_source_errors() {
    let (_tmp, config) = setup_test_env();
    run_vmirror(&config, &["init"]);

    let (_, stderr, ok) = run_vmirror(&config, &["status", "42"]);
    assert!(!ok);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);

    let (_, _, ok) = run_vmirror(&config, &["sync", "42"]);
    assert!(!ok);

    let (_, _, ok) = run_vmirror(&config, &["sync", "abc"]);
    assert!(!ok);
}
