//! HTTP-level tests for the jobs API, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bulksend_jobs::{DeliveryOutcome, JobRegistry, RunnerConfig, Transport};
use bulksend_server::{create_app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

struct InstantTransport;

#[async_trait]
impl Transport for InstantTransport {
    async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
        DeliveryOutcome::Sent
    }
}

struct MissingToken;

#[async_trait]
impl Transport for MissingToken {
    fn check_config(&self) -> Result<(), String> {
        Err("BULKSEND_BOT_TOKEN is not set".into())
    }

    async fn send(&self, _: &str, _: &str, _: &str) -> DeliveryOutcome {
        DeliveryOutcome::Sent
    }
}

fn app_with(transport: Arc<dyn Transport>) -> axum::Router {
    let config = RunnerConfig {
        inter_message_delay: Duration::from_millis(100),
        retention: Duration::from_secs(60),
        ..RunnerConfig::default()
    };
    create_app(AppState::new(JobRegistry::new(transport, config)))
}

fn app() -> axum::Router {
    app_with(Arc::new(InstantTransport))
}

/// Helper to make a request to the app.
async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = if let Some(json) = body {
        builder = builder.header("content-type", "application/json");
        Body::from(serde_json::to_string(&json).unwrap())
    } else {
        Body::empty()
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn job_body(rows: usize) -> Value {
    let rows: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "chat": 1000 + i,
                "photo": format!("https://cdn.example/{i}.jpg"),
                "name": format!("Item {i}"),
            })
        })
        .collect();
    json!({
        "rows": rows,
        "mapping": { "destination": "chat", "image": "photo", "title": "name" },
    })
}

async fn submit(app: &axum::Router, rows: usize) -> String {
    let (status, body) = request(app.clone(), "POST", "/api/jobs", Some(job_body(rows))).await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {body}");
    let json: Value = serde_json::from_str(&body).unwrap();
    json["jobId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check() {
    let (status, body) = request(app(), "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["jobs"], 0);
}

#[tokio::test(start_paused = true)]
async fn submitted_job_runs_to_completion() {
    let app = app();
    let id = submit(&app, 3).await;

    let snapshot = loop {
        let (status, body) = request(app.clone(), "GET", &format!("/api/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        let sent = json["sent"].as_u64().unwrap();
        let failed = json["failed"].as_u64().unwrap();
        let current = json["current"].as_u64().unwrap();
        assert!(sent + failed <= current && current <= 3);
        if json["status"] == "completed" {
            break json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(snapshot["id"], id.as_str());
    assert_eq!(snapshot["total"], 3);
    assert_eq!(snapshot["sent"], 3);
    assert_eq!(snapshot["failed"], 0);
    assert_eq!(snapshot["percent"], 100);
    assert_eq!(snapshot["errors"], json!([]));
    assert!(snapshot["startedAt"].is_string());
    assert!(snapshot["finishedAt"].is_string());

    let (status, body) = request(app, "GET", "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let list: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
}

#[tokio::test(start_paused = true)]
async fn event_stream_replays_and_closes_after_done() {
    let app = app();
    let id = submit(&app, 2).await;

    let (status, body) =
        request(app.clone(), "GET", &format!("/api/jobs/{id}/events"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: connected"), "body: {body}");
    assert!(body.contains("event: progress"));
    assert!(body.contains("event: log"));
    assert!(body.contains("event: done"));
    assert!(body.contains(r#""type":"done","sent":2,"failed":0,"total":2"#));

    // Late subscriber after completion: replay ends with the terminal event.
    let (_, replay) = request(app, "GET", &format!("/api/jobs/{id}/events"), None).await;
    assert!(replay.starts_with("event: connected"), "replay: {replay}");
    assert!(replay.trim_end().ends_with('}'));
    assert!(replay.contains("event: done"));
}

#[tokio::test(start_paused = true)]
async fn stop_ends_job_as_stopped() {
    let app = app();
    let id = submit(&app, 50).await;

    let (status, body) =
        request(app.clone(), "POST", &format!("/api/jobs/{id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "ok": true }));

    // Idempotent.
    let (status, _) = request(app.clone(), "POST", &format!("/api/jobs/{id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, events) = request(app.clone(), "GET", &format!("/api/jobs/{id}/events"), None).await;
    assert!(events.contains("event: stopped"), "events: {events}");
    assert!(!events.contains("event: done"));

    let (_, body) = request(app, "GET", &format!("/api/jobs/{id}"), None).await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "stopped");
    assert!(json["current"].as_u64().unwrap() < 50);
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = app();
    let id = bulksend_jobs::JobId::new();

    for (method, uri) in [
        ("GET", format!("/api/jobs/{id}")),
        ("POST", format!("/api/jobs/{id}/stop")),
        ("GET", format!("/api/jobs/{id}/events")),
        ("GET", "/api/jobs/not-a-job-id".to_string()),
    ] {
        let (status, body) = request(app.clone(), method, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Job not found");
    }
}

#[tokio::test]
async fn invalid_submissions_are_400() {
    let app = app();

    let (status, body) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({ "rows": [], "mapping": { "destination": "chat", "image": "photo" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["details"], "rows must not be empty");

    let (status, body) = request(
        app.clone(),
        "POST",
        "/api/jobs",
        Some(json!({ "rows": [{ "chat": 1 }], "mapping": { "destination": "chat" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("image"));

    let (_, body) = request(app, "GET", "/api/jobs", None).await;
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn missing_credentials_are_503() {
    let app = app_with(Arc::new(MissingToken));
    let (status, body) = request(app, "POST", "/api/jobs", Some(job_body(1))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Configuration missing");
    assert_eq!(json["details"], "BULKSEND_BOT_TOKEN is not set");
}
