// crates/sqlroute-server/src/audit.rs
// ============================================================================
// Module: Router Audit Logging
// Description: Structured audit events for request handling and lifecycle.
// Purpose: Emit JSON-lines logs without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serialized as one JSON object per line. Sinks write to
//! stderr, to an append-only file, or nowhere. Write failures are swallowed so
//! logging never fails a request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

use crate::telemetry::RequestOutcome;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Per-request audit event.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Server-assigned request identifier.
    pub request_id: u64,
    /// HTTP method.
    pub method: String,
    /// Request path as received.
    pub path: String,
    /// Matched route pattern.
    pub pattern: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Error message when the request failed.
    pub error: Option<String>,
    /// Number of rows returned.
    pub rows: usize,
    /// Handling time in microseconds.
    pub duration_us: u64,
}

/// Inputs required to construct a request audit event.
pub struct RequestAuditEventParams {
    /// Server-assigned request identifier.
    pub request_id: u64,
    /// HTTP method.
    pub method: String,
    /// Request path as received.
    pub path: String,
    /// Matched route pattern.
    pub pattern: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Error message when the request failed.
    pub error: Option<String>,
    /// Number of rows returned.
    pub rows: usize,
    /// Handling time in microseconds.
    pub duration_us: u64,
}

impl RequestAuditEvent {
    /// Creates a request audit event stamped with the current time.
    #[must_use]
    pub fn new(params: RequestAuditEventParams) -> Self {
        Self {
            event: "request",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            method: params.method,
            path: params.path,
            pattern: params.pattern,
            status: params.status,
            outcome: params.outcome,
            error: params.error,
            rows: params.rows,
            duration_us: params.duration_us,
        }
    }
}

/// Startup, reload, and shutdown events.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Lifecycle kind, such as `routes_loaded` or `route_ambiguity`.
    pub kind: &'static str,
    /// Severity label.
    pub level: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    pub details: Value,
}

impl LifecycleEvent {
    /// Creates an informational lifecycle event.
    #[must_use]
    pub fn info(kind: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self::with_level("info", kind, message, details)
    }

    /// Creates a warning lifecycle event.
    #[must_use]
    pub fn warning(kind: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self::with_level("warn", kind, message, details)
    }

    /// Builds the event.
    fn with_level(
        level: &'static str,
        kind: &'static str,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            event: "lifecycle",
            timestamp_ms: now_ms(),
            kind,
            level,
            message: message.into(),
            details,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for router events.
pub trait AuditSink: Send + Sync {
    /// Records a request event.
    fn record_request(&self, event: &RequestAuditEvent);

    /// Records a lifecycle event.
    fn record_lifecycle(&self, _event: &LifecycleEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_lifecycle(&self, event: &LifecycleEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn append(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }

    fn record_lifecycle(&self, event: &LifecycleEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_request(&self, _event: &RequestAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns milliseconds since the unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
