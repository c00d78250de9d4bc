//! HTTP and WebSocket surface

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use flux_progress::config::Settings;
use flux_progress::{server, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;

fn app() -> Router {
    server::router(Arc::new(AppState::new(Settings::default(), None)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn sync_run_over_http() {
    let app = app();

    let (status, body) = call(&app, "POST", "/api/sync/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["syncing"], true);
    assert_eq!(body["current_stage"], "idle");

    call(&app, "POST", "/api/sync/stage", Some(json!({ "stage": "categories" }))).await;
    call(&app, "POST", "/api/sync/categories", Some(json!({ "count": 12 }))).await;
    let (_, body) = call(&app, "POST", "/api/sync/stage", Some(json!({ "stage": "feeds" }))).await;

    let stages = body["stages"].as_array().unwrap();
    assert_eq!(stages[0]["stage"], "categories");
    assert_eq!(stages[0]["status"], "completed");
    assert_eq!(stages[0]["description"], "12 categories");
    assert_eq!(stages[1]["status"], "active");
    assert_eq!(stages[2]["status"], "pending");
    assert_eq!(body["overall_percentage"], 25);

    let (_, body) = call(
        &app,
        "POST",
        "/api/sync/complete",
        Some(json!({
            "categories_pulled": 12,
            "feeds_pulled": 30,
            "entries_pulled": 400,
            "entries_pushed": 2
        })),
    )
    .await;
    assert_eq!(body["syncing"], false);
    assert_eq!(body["current_stage"], "completed");
    assert_eq!(body["last_summary"]["entries_pulled"], 400);
    assert!(body["last_synced_at"].is_string());
}

#[tokio::test]
async fn unknown_stage_is_rejected() {
    let app = app();
    let (status, body) = call(&app, "POST", "/api/sync/stage", Some(json!({ "stage": "push" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown sync stage: push");
}

#[tokio::test]
async fn failed_sync_over_http() {
    let app = app();
    call(&app, "POST", "/api/sync/start", None).await;
    let (_, body) = call(&app, "POST", "/api/sync/fail", Some(json!({ "message": "401" }))).await;

    assert_eq!(body["error"], "401");
    assert_eq!(body["current_stage"], "failed");
    assert_eq!(body["status_text"], "Sync failed: 401");

    let (_, body) = call(&app, "POST", "/api/sync/error", Some(json!({ "message": null }))).await;
    assert_eq!(body["error"], Value::Null);
}

#[tokio::test]
async fn download_events_and_user_actions() {
    let app = app();

    let (status, body) = call(
        &app,
        "POST",
        "/api/downloads/events",
        Some(json!({
            "enclosure_id": 1,
            "file_name": "a.jpg",
            "url": "https://x/a.jpg",
            "progress": 0,
            "downloaded_bytes": 0,
            "total_bytes": 1000,
            "status": "downloading"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["item"]["speed"], 0.0);

    let (status, _) = call(
        &app,
        "POST",
        "/api/downloads/events",
        Some(json!({ "enclosure_id": 1, "status": "teleporting" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", "/api/downloads/1/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "cancel");
    assert_eq!(body["file_name"], "a.jpg");

    let (_, body) = call(&app, "GET", "/api/downloads", None).await;
    assert_eq!(body["active_count"], 1);
    assert_eq!(body["items"][0]["status"], "downloading");

    let (status, body) = call(
        &app,
        "POST",
        "/api/downloads/events",
        Some(json!({
            "enclosure_id": 1,
            "status": "completed",
            "progress": 100,
            "downloaded_bytes": 1000,
            "total_bytes": 1000,
            "file_path": "/downloads/a.jpg"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notification"]["status"], "completed");

    let (_, body) = call(&app, "POST", "/api/downloads/clear-completed", None).await;
    assert_eq!(body["removed"], json!([1]));

    let (status, _) = call(&app, "DELETE", "/api/downloads/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "POST", "/api/downloads/1/retry", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_event_is_accepted_but_not_applied() {
    let app = app();
    let event = |bytes: u64| {
        json!({
            "enclosure_id": 2,
            "status": "downloading",
            "downloaded_bytes": bytes,
            "total_bytes": 1000
        })
    };

    call(&app, "POST", "/api/downloads/events", Some(event(600))).await;
    let (status, body) = call(&app, "POST", "/api/downloads/events", Some(event(100))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["applied"], false);

    let (status, _) = call(&app, "DELETE", "/api/downloads/2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn websocket_streams_changes_and_accepts_events() {
    let state = Arc::new(AppState::new(Settings::default(), None));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, server::router(state.clone())).into_future());

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    assert_eq!(next_json(&mut socket).await["type"], "sync");
    assert_eq!(next_json(&mut socket).await["type"], "downloads");

    socket
        .send(Message::Text(
            json!({ "enclosureId": 8, "status": "downloading", "fileName": "ep.mp3" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let update = next_json(&mut socket).await;
    assert_eq!(update["type"], "download");
    assert_eq!(update["enclosure_id"], 8);
    assert_eq!(state.downloads.get(8).unwrap().file_name, "ep.mp3");
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        if let Message::Text(text) = socket.next().await.unwrap().unwrap() {
            return serde_json::from_str(&text).unwrap();
        }
    }
}
