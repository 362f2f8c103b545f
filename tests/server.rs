//! HTTP API tests: the router served on a loopback port, driven with reqwest.

use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use vmirror::config::Config;
use vmirror::models::NewSource;
use vmirror::server::{router, AppState};
use vmirror::{db, migrate};

// ─── Helpers ────────────────────────────────────────────────────────

const DUMP: &str = r#"{
  "vms": [
    { "moid": "vm-1", "name": "web01", "cluster": "prod", "power_state": "poweredOn" },
    { "moid": "vm-2", "name": "db01", "cluster": "prod", "power_state": "poweredOff" }
  ],
  "hosts": [{ "moid": "host-1", "name": "esx01", "cluster": "prod", "vm_count": 2 }]
}"#;

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("inventory.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[sync]
interval_minutes = 0

[server]
bind = "127.0.0.1:0"
"#,
        db_path.display()
    );
    toml::from_str(&config_content).unwrap()
}

/// Serve the API on an ephemeral port with one file-backed source (id 1).
async fn start_server(tmp: &TempDir) -> String {
    let cfg = test_config(tmp);
    let dump_path = tmp.path().join("vc01.json");
    fs::write(&dump_path, DUMP).unwrap();

    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let state = AppState::new(&cfg, pool).unwrap();
    state
        .orchestrator()
        .store()
        .add_source(&NewSource::new("vc01.lab", "file").endpoint(dump_path.to_str().unwrap()))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let base = format!("http://{}", addr);
    wait_for_server(&base).await;
    base
}

async fn wait_for_server(base: &str) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", base);
    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_source_listing() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let sources: Value = client
        .get(format!("{}/api/sources", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sources.as_array().unwrap().len(), 1);
    assert_eq!(sources[0]["hostname"], "vc01.lab");
    assert_eq!(sources[0]["sync_status"], "pending");
}

#[tokio::test]
async fn test_sync_wait_then_status_and_query() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/sync", base))
        .json(&json!({ "wait": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["results"][0]["status"], "completed");
    assert_eq!(report["results"][0]["stats"]["vms"], 2);

    let status: Value = client
        .get(format!("{}/api/sources/1/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["sync_status"], "completed");
    assert!(status["last_sync"].is_string());

    let resp = client
        .post(format!("{}/api/query", base))
        .json(&json!({ "query": "list powered off vms" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();
    assert_eq!(result["entity_type"], "vm");
    assert_eq!(result["action"], "get");
    assert_eq!(result["count"], 1);
    assert_eq!(result["data"][0]["name"], "db01");
}

#[tokio::test]
async fn test_background_sync_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/sync", base))
        .json(&json!({ "source_ids": [1] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "accepted");

    let url = format!("{}/api/sources/1/status", base);
    let mut last = Value::Null;
    for _ in 0..50 {
        last = client.get(&url).send().await.unwrap().json().await.unwrap();
        if last["sync_status"] == "completed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(last["sync_status"], "completed");
}

#[tokio::test]
async fn test_error_contract() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/sources/99/status", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .post(format!("{}/api/query", base))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/api/sync", base))
        .json(&json!({ "source_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/sync", base))
        .json(&json!({ "source_ids": [99], "wait": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["results"][0]["status"], "failed");
    assert_eq!(report["results"][0]["kind"], "not_found");
}
