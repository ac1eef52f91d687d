use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tabpilot_cli::cli::runtime::build_orchestrator;
use tabpilot_cli::server::{build_router, ServerState};
use tabpilot_cli::AppConfig;
use tower::ServiceExt;

fn app() -> Router {
    let config = AppConfig::default();
    let (orchestrator, _contexts) = build_orchestrator(&config).unwrap();
    build_router(ServerState::new(orchestrator), &config.server)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn wait_until_idle(app: &Router, origin: &str) -> Value {
    for _ in 0..600 {
        let (status, body) = send(app, get(&format!("/api/tasks/{origin}"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["session"]["running"] == json!(false) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("task for {origin} never finished");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test(start_paused = true)]
async fn started_task_runs_to_completion() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/api/tasks",
            json!({"goal": "search for wireless headphones on amazon", "origin": "tab-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["task"]["generation"], 1);
    assert_eq!(body["task"]["task_type"], "generic-search");
    assert_eq!(body["task"]["created"], true);

    let body = wait_until_idle(&app, "tab-1").await;
    let session = &body["session"];
    assert_eq!(session["status"], "completed");
    assert_eq!(session["history"].as_array().unwrap().len(), 3);
    let last_line = session["thinking_log"].as_array().unwrap().last().cloned();
    assert_eq!(last_line, Some(json!("Task completed: 3/3 steps succeeded")));
}

#[tokio::test(start_paused = true)]
async fn second_goal_while_running_conflicts() {
    let app = app();
    let goal = json!({"goal": "find iphone 15 on amazon and add it to cart", "origin": "tab-1"});
    let (status, _) = send(&app, post_json("/api/tasks", goal.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, post_json("/api/tasks", goal)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "session_conflict");

    // another origin is unaffected
    let (status, _) = send(
        &app,
        post_json("/api/tasks", json!({"goal": "go to wikipedia", "origin": "tab-2"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn empty_goal_and_origin_are_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json("/api/tasks", json!({"goal": "   ", "origin": "tab-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "plan_generation_error");

    let (status, body) = send(
        &app,
        post_json("/api/tasks", json!({"goal": "go to wikipedia", "origin": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "origin is required");
}

#[tokio::test]
async fn unknown_origin_is_not_found() {
    let app = app();
    let (status, body) = send(&app, get("/api/tasks/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["state"], "not_found");

    let (status, _) = send(&app, post_json("/api/tasks/nowhere/stop", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get("/api/tasks/nowhere/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_a_running_task() {
    let app = app();
    let (status, _) = send(
        &app,
        post_json(
            "/api/tasks",
            json!({"goal": "find iphone 15 on amazon and add it to cart", "origin": "tab-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, post_json("/api/tasks/tab-1/stop", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["outcome"], "stopping");

    let body = wait_until_idle(&app, "tab-1").await;
    assert_eq!(body["session"]["status"], "aborted");

    let (status, body) = send(&app, post_json("/api/tasks/tab-1/stop", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["outcome"], "not_running");
    assert_eq!(body["result"]["status"], "aborted");
}

#[tokio::test(start_paused = true)]
async fn event_stream_is_server_sent_events() {
    let app = app();
    let (status, _) = send(
        &app,
        post_json("/api/tasks", json!({"goal": "go to wikipedia", "origin": "tab-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(get("/api/tasks/tab-1/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");
}
