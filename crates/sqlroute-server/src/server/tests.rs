// crates/sqlroute-server/src/server/tests.rs
// ============================================================================
// Module: Router Server Unit Tests
// Description: Unit tests for the request pipeline, audit, and metrics hooks.
// Purpose: Validate status mapping and context building with in-memory fixtures.
// Dependencies: sqlroute-server, sqlroute-core, sqlroute-store-sqlite
// ============================================================================

//! ## Overview
//! Drives the synchronous pipeline with a recording backend, then once more
//! against a real in-memory `SQLite` store.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only pipeline assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::body::Body;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;
use serde_json::Value;
use serde_json::json;
use sqlroute_core::BackendError;
use sqlroute_core::QueryBackend;
use sqlroute_core::QueryRows;
use sqlroute_core::RequestContext;
use sqlroute_core::RouteRegistry;
use sqlroute_core::SharedQueryBackend;
use sqlroute_core::TemplateStore;
use sqlroute_store_sqlite::SqliteRouteStore;
use sqlroute_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

use super::BodyError;
use super::IncomingRequest;
use super::RouteResponse;
use super::RouterServer;
use super::ServerParts;
use super::handle_http;
use crate::audit::AuditSink;
use crate::audit::LifecycleEvent;
use crate::audit::NoopAuditSink;
use crate::audit::RequestAuditEvent;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RequestOutcome;
use crate::telemetry::RouterMetricEvent;
use crate::telemetry::RouterMetrics;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Backend that records every context and replies with a fixed result.
struct RecordingBackend {
    reply: Result<QueryRows, BackendError>,
    calls: Mutex<Vec<(String, RequestContext)>>,
}

impl RecordingBackend {
    fn new(reply: Result<QueryRows, BackendError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, RequestContext)> {
        self.calls.lock().unwrap().clone()
    }
}

impl QueryBackend for RecordingBackend {
    fn execute(&self, template: &str, context: RequestContext) -> Result<QueryRows, BackendError> {
        self.calls.lock().unwrap().push((template.to_string(), context));
        self.reply.clone()
    }

    fn readiness(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[derive(Default)]
struct CapturingAudit {
    requests: Mutex<Vec<RequestAuditEvent>>,
    lifecycle: Mutex<Vec<LifecycleEvent>>,
}

impl AuditSink for CapturingAudit {
    fn record_request(&self, event: &RequestAuditEvent) {
        self.requests.lock().unwrap().push(event.clone());
    }

    fn record_lifecycle(&self, event: &LifecycleEvent) {
        self.lifecycle.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
struct CapturingMetrics {
    requests: Mutex<Vec<RouterMetricEvent>>,
    latencies: Mutex<Vec<Duration>>,
}

impl RouterMetrics for CapturingMetrics {
    fn record_request(&self, event: RouterMetricEvent) {
        self.requests.lock().unwrap().push(event);
    }

    fn record_latency(&self, _event: RouterMetricEvent, latency: Duration) {
        self.latencies.lock().unwrap().push(latency);
    }
}

fn template_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (relative, sql) in files {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, sql).unwrap();
    }
    dir
}

fn server_with(
    dir: &TempDir,
    backend: SharedQueryBackend,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn RouterMetrics>,
) -> RouterServer {
    let registry = RouteRegistry::open(TemplateStore::new(dir.path())).unwrap();
    RouterServer::from_parts(ServerParts {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        registry: Arc::new(registry),
        backend,
        max_body_bytes: 64,
        audit,
        metrics,
    })
}

fn simple_server(dir: &TempDir, backend: &Arc<RecordingBackend>) -> RouterServer {
    server_with(
        dir,
        SharedQueryBackend::new(Arc::clone(backend) as Arc<dyn QueryBackend + Send + Sync>),
        Arc::new(NoopAuditSink),
        Arc::new(NoopMetrics),
    )
}

fn request(method: &str, path: &str) -> IncomingRequest {
    IncomingRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: None,
        headers: BTreeMap::new(),
        body: Ok(Bytes::new()),
    }
}

fn row(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

// ============================================================================
// SECTION: Status Mapping
// ============================================================================

#[test]
fn unmatched_path_returns_404_without_touching_backend() {
    let dir = template_dir(&[("users/:id.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let response = server.handle(request("GET", "/nope"));
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, json!({ "error": "route not found" }));
    assert!(backend.calls().is_empty());
}

#[test]
fn matched_path_returns_rows_as_array() {
    let dir = template_dir(&[("users/:id.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(vec![row(json!({ "id": 42, "name": "Ada" }))]));
    let server = simple_server(&dir, &backend);

    let response = server.handle(request("GET", "/users/42"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([{ "id": 42, "name": "Ada" }]));
    assert_eq!(response.retry_after_secs, None);
}

#[test]
fn empty_result_is_empty_array() {
    let dir = template_dir(&[("index.sql", "SELECT 1 WHERE 0")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let response = server.handle(request("GET", "/"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([]));
}

#[test]
fn execution_error_returns_500_with_message() {
    let dir = template_dir(&[("broken.sql", "SELEC nonsense")]);
    let backend =
        RecordingBackend::new(Err(BackendError::Execution("near \"SELEC\": syntax error".into())));
    let server = simple_server(&dir, &backend);

    let response = server.handle(request("GET", "/broken"));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, json!({ "error": "near \"SELEC\": syntax error" }));
}

#[test]
fn overload_returns_503_with_retry_hint() {
    let dir = template_dir(&[("busy.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Err(BackendError::Overloaded {
        message: "sqlite queue full".to_string(),
        retry_after_ms: Some(50),
    }));
    let server = simple_server(&dir, &backend);

    let response = server.handle(request("GET", "/busy"));
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.retry_after_secs, Some(1));
    assert_eq!(response.body, json!({ "error": "sqlite queue full" }));

    let http = response.into_response();
    assert_eq!(http.headers().get(RETRY_AFTER).unwrap(), "1");
}

#[test]
fn unavailable_backend_returns_503() {
    let dir = template_dir(&[("busy.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Err(BackendError::Unavailable("worker stopped".into())));
    let audit = Arc::new(CapturingAudit::default());
    let server = server_with(
        &dir,
        SharedQueryBackend::new(backend as Arc<dyn QueryBackend + Send + Sync>),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        Arc::new(NoopMetrics),
    );

    let response = server.handle(request("GET", "/busy"));
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.retry_after_secs, None);

    let events = audit.requests.lock().unwrap().clone();
    assert_eq!(events[0].outcome, RequestOutcome::Unavailable);
    assert_eq!(serde_json::to_value(events[0].outcome).unwrap(), json!("unavailable"));
}

#[test]
fn oversized_body_returns_413_for_matched_route() {
    let dir = template_dir(&[("items.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let mut oversized = request("POST", "/items");
    oversized.body = Ok(Bytes::from(vec![b'x'; 65]));
    let response = server.handle(oversized);
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(backend.calls().is_empty());

    let mut unread = request("POST", "/items");
    unread.body = Err(BodyError::TooLarge);
    assert_eq!(server.handle(unread).status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn body_read_failure_returns_500_not_413() {
    let dir = template_dir(&[("echo.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let mut failed = request("POST", "/echo");
    failed.body = Err(BodyError::Read("connection reset".to_string()));
    let response = server.handle(failed);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, json!({ "error": "request body read failed: connection reset" }));
    assert!(backend.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn http_body_stream_error_is_not_reported_as_too_large() {
    let dir = template_dir(&[("echo.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let audit = Arc::new(CapturingAudit::default());
    let server = server_with(
        &dir,
        SharedQueryBackend::new(Arc::clone(&backend) as Arc<dyn QueryBackend + Send + Sync>),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        Arc::new(NoopMetrics),
    );

    let chunks = vec![Err::<Bytes, io::Error>(io::Error::other("connection reset"))];
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from_stream(tokio_stream::iter(chunks)))
        .unwrap();
    let response = handle_http(State(Arc::clone(&server.state)), request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(backend.calls().is_empty());

    let events = audit.requests.lock().unwrap().clone();
    assert_eq!(events[0].outcome, RequestOutcome::Error);
    let message = events[0].error.clone().unwrap();
    assert!(message.contains("connection reset"), "unexpected message {message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn http_body_over_limit_is_413() {
    let dir = template_dir(&[("echo.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from(vec![b'x'; 65]))
        .unwrap();
    let response = handle_http(State(Arc::clone(&server.state)), request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(backend.calls().is_empty());
}

#[test]
fn unmatched_route_wins_over_oversized_body() {
    let dir = template_dir(&[("items.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let mut unread = request("POST", "/elsewhere");
    unread.body = Err(BodyError::TooLarge);
    assert_eq!(server.handle(unread).status, StatusCode::NOT_FOUND);
}

// ============================================================================
// SECTION: Context Building
// ============================================================================

#[test]
fn context_carries_every_request_part() {
    let dir = template_dir(&[("users/:id/posts.sql", "SELECT 'posts'")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let mut incoming = request("POST", "/users/7/posts");
    incoming.query = Some("limit=5&tag=a%20b".to_string());
    incoming.headers.insert("content-type".to_string(), "application/json".to_string());
    incoming.headers.insert("x-trace".to_string(), "abc".to_string());
    incoming.body = Ok(Bytes::from_static(br#"{"title":"hi"}"#));
    let response = server.handle(incoming);
    assert_eq!(response.status, StatusCode::OK);

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    let (template, context) = &calls[0];
    assert_eq!(template, "SELECT 'posts'");
    assert_eq!(context.method, "POST");
    assert_eq!(context.path, "/users/7/posts");
    assert_eq!(context.params.get("id").map(String::as_str), Some("7"));
    assert_eq!(context.query.get("limit").map(String::as_str), Some("5"));
    assert_eq!(context.query.get("tag").map(String::as_str), Some("a b"));
    assert_eq!(context.headers.get("x-trace").map(String::as_str), Some("abc"));
    assert_eq!(context.body, json!({ "title": "hi" }));
}

#[test]
fn non_json_body_binds_as_empty_object() {
    let dir = template_dir(&[("items.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    let mut incoming = request("PUT", "/items");
    incoming.headers.insert("content-type".to_string(), "text/plain".to_string());
    incoming.body = Ok(Bytes::from_static(b"{\"a\":1}"));
    let _ = server.handle(incoming);

    let calls = backend.calls();
    assert_eq!(calls[0].1.body, json!({}));
}

#[test]
fn every_method_reaches_the_same_template() {
    let dir = template_dir(&[("items.sql", "SELECT 'items'")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let server = simple_server(&dir, &backend);

    for method in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
        assert_eq!(server.handle(request(method, "/items")).status, StatusCode::OK);
    }
    let methods: Vec<String> =
        backend.calls().into_iter().map(|(_, context)| context.method).collect();
    assert_eq!(methods, vec!["GET", "POST", "PUT", "PATCH", "DELETE"]);
}

// ============================================================================
// SECTION: Audit and Metrics
// ============================================================================

#[test]
fn requests_emit_audit_and_metric_events() {
    let dir = template_dir(&[("users/:id.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(vec![row(json!({ "one": 1 }))]));
    let audit = Arc::new(CapturingAudit::default());
    let metrics = Arc::new(CapturingMetrics::default());
    let server = server_with(
        &dir,
        SharedQueryBackend::new(backend as Arc<dyn QueryBackend + Send + Sync>),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        Arc::clone(&metrics) as Arc<dyn RouterMetrics>,
    );

    let _ = server.handle(request("GET", "/users/1"));
    let _ = server.handle(request("GET", "/missing"));

    let events = audit.requests.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].request_id, 1);
    assert_eq!(events[0].pattern.as_deref(), Some("/users/:id"));
    assert_eq!(events[0].outcome, RequestOutcome::Ok);
    assert_eq!(events[0].rows, 1);
    assert_eq!(events[1].request_id, 2);
    assert_eq!(events[1].status, 404);
    assert_eq!(events[1].pattern, None);

    let recorded = metrics.requests.lock().unwrap().clone();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[1].outcome, RequestOutcome::NotFound);
    assert_eq!(metrics.latencies.lock().unwrap().len(), 2);
}

#[test]
fn reload_announces_routes_and_ambiguities() {
    let dir = template_dir(&[("users/:id.sql", "SELECT 1")]);
    let backend = RecordingBackend::new(Ok(Vec::new()));
    let audit = Arc::new(CapturingAudit::default());
    let server = server_with(
        &dir,
        SharedQueryBackend::new(backend as Arc<dyn QueryBackend + Send + Sync>),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        Arc::new(NoopMetrics),
    );

    fs::write(dir.path().join("users").join(":name.sql"), "SELECT 2").unwrap();
    let revision = server.reload_routes().unwrap();
    assert_eq!(revision, 2);

    let lifecycle = audit.lifecycle.lock().unwrap().clone();
    let reloaded = lifecycle.iter().find(|event| event.kind == "routes_reloaded").unwrap();
    assert_eq!(reloaded.details["root"], json!(dir.path().display().to_string()));
    assert!(lifecycle.iter().any(|event| event.kind == "route_ambiguity" && event.level == "warn"));
}

// ============================================================================
// SECTION: SQLite Backend
// ============================================================================

#[test]
fn sqlite_backend_serves_parameterized_lookup() {
    let dir = template_dir(&[(
        "users/:id.sql",
        "SELECT u.id, u.name FROM users u, request_context rc WHERE u.id = \
         CAST(json_extract(rc.params, '$.id') AS INTEGER)",
    )]);
    let store = SqliteRouteStore::open(SqliteStoreConfig::default()).unwrap();
    store.query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)").unwrap();
    store.query("INSERT INTO users (id, name) VALUES (42, 'Ada')").unwrap();
    let server = server_with(
        &dir,
        SharedQueryBackend::from_backend(store.clone()),
        Arc::new(NoopAuditSink),
        Arc::new(NoopMetrics),
    );

    let found: RouteResponse = server.handle(request("GET", "/users/42"));
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body, json!([{ "id": 42, "name": "Ada" }]));

    let missing = server.handle(request("GET", "/users/9"));
    assert_eq!(missing.body, json!([]));

    let leftover = store
        .query("SELECT count(*) AS n FROM sqlite_master WHERE name = 'request_context'")
        .unwrap();
    assert_eq!(leftover[0].get("n"), Some(&json!(0)));
}
