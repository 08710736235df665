// crates/sqlroute-server/src/lib.rs
// ============================================================================
// Module: SQL Route Server Library
// Description: HTTP surface for SQL Route.
// Purpose: Route inbound requests to SQL templates and render JSON responses.
// Dependencies: sqlroute-core, sqlroute-store-sqlite, sqlroute-config, axum, tokio
// ============================================================================

//! ## Overview
//! [`RouterServer`] wires the route registry, the `SQLite` backend, audit
//! logging, and metrics into one axum service. Every method and path reaches
//! the same handler; the route table decides what answers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::LifecycleEvent;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::RequestAuditEventParams;
pub use audit::StderrAuditSink;
pub use server::BodyError;
pub use server::IncomingRequest;
pub use server::RouteResponse;
pub use server::RouterServer;
pub use server::RouterServerError;
pub use server::ServerParts;
pub use telemetry::NoopMetrics;
pub use telemetry::RequestOutcome;
pub use telemetry::RouterMetricEvent;
pub use telemetry::RouterMetrics;
