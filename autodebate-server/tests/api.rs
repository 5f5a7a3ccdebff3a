//! HTTP API tests driven through the router without binding a socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autodebate_engine::llm::{ChatMessage, Reply, TextGenerator, ToolDef};
use autodebate_engine::profile::ProfileStore;
use autodebate_engine::tools::Toolbox;
use autodebate_engine::{Controller, ControllerConfig, GeneratorSource, ProviderError, TranscriptStore};
use autodebate_server::web::{AppState, router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Canned;

#[async_trait]
impl TextGenerator for Canned {
    async fn chat(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _tools: &[ToolDef],
    ) -> Result<Reply, ProviderError> {
        Ok(Reply::text("a fair point"))
    }
}

fn app(profile_dir: &tempfile::TempDir) -> Router {
    let store = Arc::new(TranscriptStore::open_memory().unwrap());
    let profile = ProfileStore::new(profile_dir.path().join("profile.md"));
    let controller = Controller::new(
        store,
        GeneratorSource::Fixed(Arc::new(Canned)),
        ControllerConfig::default(),
    )
    .with_toolbox(Toolbox::default());
    router(Arc::new(AppState { controller, profile }), None)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = tokio::time::timeout(Duration::from_secs(10), app.clone().oneshot(request))
        .await
        .expect("request should complete")
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = tokio::time::timeout(Duration::from_secs(10), response.into_body().collect())
        .await
        .expect("body should complete")
        .unwrap()
        .to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create(app: &Router, motion: &str) -> String {
    let (status, _, body) = send(
        app,
        json_request("POST", "/api/debates", json!({ "motion": motion, "mode": "simple" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let created: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["mode"], "simple");
    assert_eq!(created["motion"], motion);
    created["debate_id"].as_str().unwrap().to_string()
}

fn data_lines(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(str::trim)
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let (status, _, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["live_sessions"], 0);
}

#[tokio::test]
async fn created_debate_streams_to_done() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create(&app, "Cities should ban cars").await;

    let (status, headers, body) = send(&app, get(&format!("/api/debates/{id}/stream"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));

    let data = data_lines(&body);
    assert_eq!(data.len(), 6, "{body}");
    assert_eq!(data.last(), Some(&"[DONE]"));
    let opening: Value = serde_json::from_str(data[0]).unwrap();
    assert_eq!(opening["name"], "mod");
    for line in &data[1..5] {
        let msg: Value = serde_json::from_str(line).unwrap();
        assert_eq!(msg["message"], "a fair point");
        assert_eq!(msg["debate_id"], id.as_str());
    }

    let (status, _, body) = send(&app, get(&format!("/api/debates/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let detail: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(detail["messages"].as_array().unwrap().len(), 5);
    assert_eq!(detail["meta"]["debate_id"], id.as_str());
}

#[tokio::test]
async fn unknown_debate_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    for uri in ["/api/debates/missing", "/api/debates/missing/stream"] {
        let (status, _, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body.contains("missing"));
    }
}

#[tokio::test]
async fn blank_motion_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/debates", json!({ "motion": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_renders_markdown_and_rejects_unknown_formats() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create(&app, "Four-day weeks work").await;
    // Drain the stream so the transcript is complete.
    send(&app, get(&format!("/api/debates/{id}/stream"))).await;

    let (status, headers, body) = send(&app, get(&format!("/api/debates/{id}/export?format=md"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/markdown"));
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(&format!("{id}.md"))
    );
    assert!(body.starts_with("# Debate Transcript"));

    let (status, _, _) = send(&app, get(&format!("/api/debates/{id}/export?format=pdf"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (_, _, body) = send(&app, get("/api/profile")).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["content"], "");

    let (status, _, body) = send(
        &app,
        json_request("PUT", "/api/profile", json!({ "content": "I teach physics." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["status"], "saved");

    let (_, _, body) = send(&app, get("/api/profile")).await;
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap()["content"],
        "I teach physics."
    );
}
