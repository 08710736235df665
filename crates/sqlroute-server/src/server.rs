// crates/sqlroute-server/src/server.rs
// ============================================================================
// Module: Router Server
// Description: HTTP server that answers every request from a SQL template.
// Purpose: Match paths, bind request context, execute, and render JSON.
// Dependencies: sqlroute-core, sqlroute-store-sqlite, sqlroute-config, axum, tokio
// ============================================================================

//! ## Overview
//! One fallback handler receives every method and path. The handler reads the
//! body under the configured limit, then hands the request to a synchronous
//! pipeline: match, build context, execute on the backend, render. Backend
//! calls block on the store's worker queue, so they run through
//! `block_in_place` on multi-threaded runtimes.
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | rows | 200 | JSON array of row objects |
//! | no route | 404 | `{"error":"route not found"}` |
//! | body over limit | 413 | `{"error":"request body too large"}` |
//! | body read failure | 500 | `{"error":"request body read failed: <detail>"}` |
//! | bind or execution failure | 500 | `{"error":"<engine message>"}` |
//! | queue full or backend gone | 503 | `{"error":"<detail>"}` |

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::extract::rejection::FailedToBufferBody;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::Value;
use serde_json::json;
use sqlroute_config::AuditConfig;
use sqlroute_config::SqlRouteConfig;
use sqlroute_core::BackendError;
use sqlroute_core::QueryBackend;
use sqlroute_core::QueryRows;
use sqlroute_core::RequestContext;
use sqlroute_core::RouteRegistry;
use sqlroute_core::SharedQueryBackend;
use sqlroute_core::TemplateStore;
use sqlroute_core::collect_headers;
use sqlroute_core::parse_body;
use sqlroute_core::parse_query;
use sqlroute_store_sqlite::SqliteRouteStore;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::LifecycleEvent;
use crate::audit::NoopAuditSink;
use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditEventParams;
use crate::audit::StderrAuditSink;
use crate::telemetry::NoopMetrics;
use crate::telemetry::RequestOutcome;
use crate::telemetry::RouterMetricEvent;
use crate::telemetry::RouterMetrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Error text for unmatched paths.
const ROUTE_NOT_FOUND: &str = "route not found";
/// Header consulted for JSON body parsing.
const CONTENT_TYPE_HEADER: &str = "content-type";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server construction and transport errors.
#[derive(Debug, Error)]
pub enum RouterServerError {
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
    /// Startup failed (templates, database, or migrations).
    #[error("init error: {0}")]
    Init(String),
    /// Listener or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Reasons a request body could not be buffered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    /// Body exceeded the configured limit.
    #[error("request body too large")]
    TooLarge,
    /// Transport failed while the body was being read.
    #[error("request body read failed: {0}")]
    Read(String),
}

// ============================================================================
// SECTION: Request and Response Types
// ============================================================================

/// Transport-neutral view of one inbound request.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// HTTP method.
    pub method: String,
    /// Raw request path, without the query string.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Buffered body bytes, or why they could not be read.
    pub body: Result<Bytes, BodyError>,
}

/// Rendered response for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON payload.
    pub body: Value,
    /// Retry hint in seconds for overload responses.
    pub retry_after_secs: Option<u64>,
}

impl RouteResponse {
    /// Builds a 200 response from result rows.
    fn rows(rows: QueryRows) -> Self {
        Self {
            status: StatusCode::OK,
            body: Value::Array(rows.into_iter().map(Value::Object).collect()),
            retry_after_secs: None,
        }
    }

    /// Builds an error response with an `{"error": ...}` body.
    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for RouteResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, axum::Json(self.body)).into_response();
        if let Some(seconds) = self.retry_after_secs {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Components used to assemble a server without a config file.
pub struct ServerParts {
    /// Listen address.
    pub bind: SocketAddr,
    /// Route registry.
    pub registry: Arc<RouteRegistry>,
    /// Query backend.
    pub backend: SharedQueryBackend,
    /// Maximum accepted body size.
    pub max_body_bytes: usize,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn RouterMetrics>,
}

/// SQL Route HTTP server.
pub struct RouterServer {
    /// Listen address.
    bind: SocketAddr,
    /// Shared handler state.
    state: Arc<ServerState>,
}

/// Shared state for the request handler.
struct ServerState {
    /// Live route table owner.
    registry: Arc<RouteRegistry>,
    /// Backend executing templates.
    backend: SharedQueryBackend,
    /// Maximum accepted body size.
    max_body_bytes: usize,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn RouterMetrics>,
    /// Next request identifier.
    next_request_id: AtomicU64,
}

impl RouterServer {
    /// Builds a server from configuration.
    ///
    /// Loads templates, opens the database, and applies pending migrations
    /// when configured to, all before any traffic is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RouterServerError`] when any startup step fails.
    pub fn from_config(config: SqlRouteConfig) -> Result<Self, RouterServerError> {
        config.validate().map_err(|err| RouterServerError::Config(err.to_string()))?;
        let bind =
            config.server.bind_addr().map_err(|err| RouterServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.server.audit)?;
        let registry = RouteRegistry::open(TemplateStore::new(&config.templates.root))
            .map_err(|err| RouterServerError::Init(err.to_string()))?;
        let store = SqliteRouteStore::open(config.database.store_config())
            .map_err(|err| RouterServerError::Init(err.to_string()))?;
        store.readiness().map_err(|err| RouterServerError::Init(err.to_string()))?;
        if let Some(dir) = config.migrations.dir.as_deref()
            && config.migrations.apply_on_start
        {
            let applied =
                store.run_migrations(dir).map_err(|err| RouterServerError::Init(err.to_string()))?;
            audit.record_lifecycle(&LifecycleEvent::info(
                "migrations_applied",
                format!("applied {} migration(s)", applied.len()),
                json!({ "applied": applied }),
            ));
        }
        let server = Self::from_parts(ServerParts {
            bind,
            registry: Arc::new(registry),
            backend: SharedQueryBackend::from_backend(store),
            max_body_bytes: config.server.max_body_bytes,
            audit,
            metrics: Arc::new(NoopMetrics),
        });
        server.state.announce_routes("routes_loaded");
        Ok(server)
    }

    /// Assembles a server from prepared components.
    #[must_use]
    pub fn from_parts(parts: ServerParts) -> Self {
        Self {
            bind: parts.bind,
            state: Arc::new(ServerState {
                registry: parts.registry,
                backend: parts.backend,
                max_body_bytes: parts.max_body_bytes,
                audit: parts.audit,
                metrics: parts.metrics,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the configured listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Returns the route registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.state.registry
    }

    /// Handles one request synchronously.
    #[must_use]
    pub fn handle(&self, request: IncomingRequest) -> RouteResponse {
        dispatch(&self.state, request)
    }

    /// Reloads templates and swaps the route table.
    ///
    /// # Errors
    ///
    /// Returns [`RouterServerError::Init`] when loading fails; the previous
    /// table stays live.
    pub fn reload_routes(&self) -> Result<u64, RouterServerError> {
        self.state.reload_routes()
    }

    /// Builds the axum application.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_http)
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the process stops.
    ///
    /// # Errors
    ///
    /// Returns [`RouterServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), RouterServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|err| RouterServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_listener(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`RouterServerError::Transport`] when serving fails.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<(), RouterServerError> {
        let local = listener
            .local_addr()
            .map_err(|err| RouterServerError::Transport(format!("listener address: {err}")))?;
        self.state.audit.record_lifecycle(&LifecycleEvent::info(
            "listening",
            format!("listening on {local}"),
            json!({ "addr": local.to_string() }),
        ));
        spawn_reload_on_hangup(Arc::clone(&self.state));
        let app = self.router();
        axum::serve(listener, app)
            .await
            .map_err(|err| RouterServerError::Transport(format!("http server failed: {err}")))
    }
}

impl ServerState {
    /// Reloads templates and announces the new table.
    fn reload_routes(&self) -> Result<u64, RouterServerError> {
        match self.registry.reload() {
            Ok(revision) => {
                self.announce_routes("routes_reloaded");
                Ok(revision)
            }
            Err(err) => {
                self.audit.record_lifecycle(&LifecycleEvent::warning(
                    "routes_reload_failed",
                    err.to_string(),
                    json!({ "revision": self.registry.revision() }),
                ));
                Err(RouterServerError::Init(err.to_string()))
            }
        }
    }

    /// Emits the route summary and one warning per ambiguous pattern pair.
    fn announce_routes(&self, kind: &'static str) {
        let table = self.registry.snapshot();
        let patterns: Vec<&str> =
            table.iter().map(|template| template.pattern().as_str()).collect();
        self.audit.record_lifecycle(&LifecycleEvent::info(
            kind,
            format!("{} route(s) active", table.len()),
            json!({
                "revision": self.registry.revision(),
                "root": self.registry.store().root().display().to_string(),
                "routes": patterns,
            }),
        ));
        for ambiguity in table.ambiguities() {
            self.audit.record_lifecycle(&LifecycleEvent::warning(
                "route_ambiguity",
                format!(
                    "{} shadows {} for overlapping paths",
                    ambiguity.winner, ambiguity.shadowed
                ),
                json!({
                    "winner": ambiguity.winner.as_str(),
                    "shadowed": ambiguity.shadowed.as_str(),
                }),
            ));
        }
    }
}

// ============================================================================
// SECTION: HTTP Handling
// ============================================================================

/// Handles every HTTP request regardless of method or path.
async fn handle_http(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let mut incoming = incoming_from_parts(&parts);
    incoming.body = read_body(Request::from_parts(parts, body)).await;
    run_blocking(|| dispatch(&state, incoming)).into_response()
}

/// Buffers the body under the router's [`DefaultBodyLimit`].
async fn read_body(request: Request) -> Result<Bytes, BodyError> {
    Bytes::from_request(request, &()).await.map_err(|rejection| match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            BodyError::TooLarge
        }
        other => BodyError::Read(other.body_text()),
    })
}

/// Converts request parts into the transport-neutral request with an empty body.
fn incoming_from_parts(parts: &Parts) -> IncomingRequest {
    let headers = collect_headers(parts.headers.iter().filter_map(|(name, value)| {
        value.to_str().ok().map(|value| (name.as_str(), value))
    }));
    IncomingRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers,
        body: Ok(Bytes::new()),
    }
}

/// Runs blocking backend work, shifting off the async executor when possible.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Reloads routes on `SIGHUP`.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: Arc<ServerState>) {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    let Ok(mut hangup) = signal(SignalKind::hangup()) else {
        return;
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let state = Arc::clone(&state);
            let _ = tokio::task::spawn_blocking(move || state.reload_routes()).await;
        }
    });
}

/// Reload on signal is unix-only.
#[cfg(not(unix))]
fn spawn_reload_on_hangup(_state: Arc<ServerState>) {}

// ============================================================================
// SECTION: Request Pipeline
// ============================================================================

/// Result of resolving one request, before audit and metrics.
struct Resolution {
    /// Rendered response.
    response: RouteResponse,
    /// Matched pattern.
    pattern: Option<String>,
    /// Outcome label.
    outcome: RequestOutcome,
    /// Error message for failed requests.
    error: Option<String>,
    /// Row count for successful requests.
    rows: usize,
}

impl Resolution {
    /// Builds a failed resolution.
    fn failure(
        status: StatusCode,
        outcome: RequestOutcome,
        pattern: Option<String>,
        message: &str,
    ) -> Self {
        Self {
            response: RouteResponse::error(status, message),
            pattern,
            outcome,
            error: Some(message.to_string()),
            rows: 0,
        }
    }
}

/// Handles one request end to end and records audit and metric events.
fn dispatch(state: &ServerState, request: IncomingRequest) -> RouteResponse {
    let started = Instant::now();
    let request_id = state.next_request_id.fetch_add(1, Ordering::Relaxed);
    let method = request.method.clone();
    let path = request.path.clone();
    let resolution = resolve(state, request);
    let elapsed = started.elapsed();
    let status = resolution.response.status.as_u16();
    state.audit.record_request(&RequestAuditEvent::new(RequestAuditEventParams {
        request_id,
        method: method.clone(),
        path,
        pattern: resolution.pattern.clone(),
        status,
        outcome: resolution.outcome,
        error: resolution.error,
        rows: resolution.rows,
        duration_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
    }));
    let metric = RouterMetricEvent {
        method,
        pattern: resolution.pattern,
        outcome: resolution.outcome,
        status,
        rows: resolution.rows,
    };
    state.metrics.record_request(metric.clone());
    state.metrics.record_latency(metric, elapsed);
    resolution.response
}

/// Matches, binds, and executes one request.
fn resolve(state: &ServerState, request: IncomingRequest) -> Resolution {
    let table = state.registry.snapshot();
    let Some(matched) = table.match_path(&request.path) else {
        return Resolution::failure(
            StatusCode::NOT_FOUND,
            RequestOutcome::NotFound,
            None,
            ROUTE_NOT_FOUND,
        );
    };
    let (template, params) = matched.into_parts();
    let pattern = Some(template.pattern().to_string());
    let bytes = match request.body {
        Ok(bytes) if bytes.len() <= state.max_body_bytes => bytes,
        Ok(_) | Err(BodyError::TooLarge) => {
            return Resolution::failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                RequestOutcome::TooLarge,
                pattern,
                &BodyError::TooLarge.to_string(),
            );
        }
        Err(err @ BodyError::Read(_)) => {
            return Resolution::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                RequestOutcome::Error,
                pattern,
                &err.to_string(),
            );
        }
    };
    let body = parse_body(request.headers.get(CONTENT_TYPE_HEADER).map(String::as_str), &bytes);
    let context = RequestContext {
        params,
        query: parse_query(request.query.as_deref()),
        headers: request.headers,
        body,
        method: request.method,
        path: request.path,
    };
    match state.backend.execute(template.text(), context) {
        Ok(rows) => {
            let count = rows.len();
            Resolution {
                response: RouteResponse::rows(rows),
                pattern,
                outcome: RequestOutcome::Ok,
                error: None,
                rows: count,
            }
        }
        Err(BackendError::Overloaded {
            message,
            retry_after_ms,
        }) => {
            let mut resolution = Resolution::failure(
                StatusCode::SERVICE_UNAVAILABLE,
                RequestOutcome::Overloaded,
                pattern,
                &message,
            );
            resolution.response.retry_after_secs = retry_after_ms.map(|ms| ms.div_ceil(1_000));
            resolution
        }
        Err(err @ BackendError::Unavailable(_)) => Resolution::failure(
            StatusCode::SERVICE_UNAVAILABLE,
            RequestOutcome::Unavailable,
            pattern,
            &err.to_string(),
        ),
        Err(err @ (BackendError::Bind(_) | BackendError::Execution(_))) => Resolution::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            RequestOutcome::Error,
            pattern,
            &err.to_string(),
        ),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the configured audit sink.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, RouterServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(path).map_err(|err| {
                RouterServerError::Init(format!("audit log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
