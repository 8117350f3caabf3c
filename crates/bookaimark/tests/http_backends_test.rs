//! The remote settings backends against in-process mock servers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bookaimark::settings::content_repo::ContentRepoBackend;
use bookaimark::settings::remote_table::RemoteTableBackend;
use bookaimark::settings::{SettingsBackend, StoredSetting, TriStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

// --- remote table -----------------------------------------------------------

#[derive(Clone, Default)]
struct TableState {
    rows: Arc<Mutex<HashMap<(String, String), Value>>>,
    fail: bool,
}

async fn table_get(
    State(state): State<TableState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    if state.fail {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("service-key") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let user = query["user_id"].trim_start_matches("eq.").to_string();
    let key = query["setting_key"].trim_start_matches("eq.").to_string();
    let rows = state.rows.lock().unwrap();
    Ok(Json(rows.get(&(user, key)).cloned().into_iter().collect()))
}

async fn table_post(
    State(state): State<TableState>,
    headers: HeaderMap,
    Json(body): Json<Vec<Value>>,
) -> StatusCode {
    if state.fail {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    let prefer = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !prefer.contains("resolution=merge-duplicates") {
        return StatusCode::CONFLICT;
    }
    let mut rows = state.rows.lock().unwrap();
    for row in body {
        let user = row["user_id"].as_str().unwrap().to_string();
        let key = row["setting_key"].as_str().unwrap().to_string();
        rows.insert(
            (user, key),
            json!({ "setting_value": row["setting_value"], "updated_at": row["updated_at"] }),
        );
    }
    StatusCode::CREATED
}

async fn table_server(state: TableState) -> String {
    let router = Router::new()
        .route("/rest/v1/user_settings", get(table_get).post(table_post))
        .with_state(state);
    spawn(router).await
}

#[tokio::test]
async fn test_remote_table_upserts_and_reads_back() {
    let url = table_server(TableState::default()).await;
    let backend = RemoteTableBackend::new(client(), &url, "service-key", "user_settings");

    assert_eq!(backend.read("u1", "theme").await.unwrap(), None);

    let first = StoredSetting::now(json!("dark"));
    backend.write("u1", "theme", &first).await.unwrap();
    let second = StoredSetting::now(json!("light"));
    backend.write("u1", "theme", &second).await.unwrap();

    let read = backend.read("u1", "theme").await.unwrap().unwrap();
    assert_eq!(read, second);
}

#[tokio::test]
async fn test_remote_table_error_status_is_a_backend_error() {
    let url = table_server(TableState {
        fail: true,
        ..Default::default()
    })
    .await;
    let backend = RemoteTableBackend::new(client(), &url, "service-key", "user_settings");

    let err = backend.read("u1", "theme").await.unwrap_err();
    assert!(err.to_string().starts_with("remote_table backend error: status 503"));
}

// --- content repository -----------------------------------------------------

#[derive(Clone, Default)]
struct RepoState {
    files: Arc<Mutex<HashMap<String, (String, String)>>>,
    puts: Arc<Mutex<Vec<Value>>>,
}

async fn repo_get(
    State(state): State<RepoState>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    assert_eq!(query.get("ref").map(String::as_str), Some("main"));
    let files = state.files.lock().unwrap();
    let (content, sha) = files.get(&path).ok_or(StatusCode::NOT_FOUND)?;
    // Wrapped like the real API.
    let wrapped = content
        .as_bytes()
        .chunks(60)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Json(json!({ "content": wrapped, "sha": sha })))
}

async fn repo_put(
    State(state): State<RepoState>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut files = state.files.lock().unwrap();
    let current_sha = files.get(&path).map(|(_, sha)| sha.clone());
    if body.get("sha").and_then(Value::as_str).map(str::to_string) != current_sha {
        return StatusCode::CONFLICT;
    }
    let next_sha = format!("sha-{}", state.puts.lock().unwrap().len() + 1);
    let content = body["content"].as_str().unwrap().to_string();
    files.insert(path, (content, next_sha));
    state.puts.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn repo_server(state: RepoState) -> String {
    let router = Router::new()
        .route(
            "/repos/{owner}/{repo}/contents/{*path}",
            get(repo_get).put(repo_put),
        )
        .with_state(state);
    spawn(router).await
}

#[tokio::test]
async fn test_content_repo_creates_then_updates_with_sha() {
    let state = RepoState::default();
    let url = repo_server(state.clone()).await;
    let backend = ContentRepoBackend::new(client(), &url, "acme", "settings", "main", "token");

    assert_eq!(backend.read("u1", "layout").await.unwrap(), None);

    let value = json!({ "columns": 3, "dense": true });
    backend
        .write("u1", "layout", &StoredSetting::now(value.clone()))
        .await
        .unwrap();
    backend
        .write("u1", "layout", &StoredSetting::now(json!({ "columns": 4 })))
        .await
        .unwrap();

    let puts = state.puts.lock().unwrap().clone();
    assert_eq!(puts.len(), 2);
    assert!(puts[0].get("sha").is_none());
    assert_eq!(puts[1]["sha"], "sha-1");
    assert_eq!(puts[1]["branch"], "main");
    assert!(state
        .files
        .lock()
        .unwrap()
        .contains_key("config/layout/u1.json"));

    let read = backend.read("u1", "layout").await.unwrap().unwrap();
    assert_eq!(read.value, json!({ "columns": 4 }));
}

#[tokio::test]
async fn test_content_repo_reads_legacy_bare_values() {
    let state = RepoState::default();
    state.files.lock().unwrap().insert(
        "config/theme/u1.json".to_string(),
        (BASE64.encode("\"dark\""), "sha-0".to_string()),
    );
    let url = repo_server(state).await;
    let backend = ContentRepoBackend::new(client(), &url, "acme", "settings", "main", "token");

    let read = backend.read("u1", "theme").await.unwrap().unwrap();
    assert_eq!(read.value, json!("dark"));
    assert_eq!(read.updated_at.timestamp(), 0);
}

// --- tri-store over real backends --------------------------------------------

#[tokio::test]
async fn test_tri_store_survives_remote_outage() {
    let down = table_server(TableState {
        fail: true,
        ..Default::default()
    })
    .await;
    let repo = repo_server(RepoState::default()).await;

    let remote: Arc<dyn SettingsBackend> = Arc::new(RemoteTableBackend::new(
        client(),
        &down,
        "service-key",
        "user_settings",
    ));
    let content: Arc<dyn SettingsBackend> = Arc::new(ContentRepoBackend::new(
        client(),
        &repo,
        "acme",
        "settings",
        "main",
        "token",
    ));
    let store = TriStore::new(vec![remote, content]);

    let report = store.write("u1", "theme", json!("dark")).await.unwrap();
    assert_eq!(report.succeeded, vec!["content_repo", "mirror"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].backend, "remote_table");

    let read = store.read("u1", "theme", json!("light")).await.unwrap();
    assert_eq!(read.value, json!("dark"));
    assert_eq!(read.source, Some("content_repo"));
}
