// crates/sqlroute-server/src/telemetry.rs
// ============================================================================
// Module: Router Telemetry
// Description: Metric hooks for routed HTTP requests.
// Purpose: Provide request counters and latency observations without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface so deployments can plug in their own exporter.
//! Labels carry the matched route pattern, never the concrete request path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const ROUTER_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Request outcome classification.
///
/// # Invariants
/// - Serialized labels are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Template executed and rows returned.
    Ok,
    /// No route matched.
    NotFound,
    /// Body exceeded the configured limit.
    TooLarge,
    /// Binding or execution failed.
    Error,
    /// Backend queue full.
    Overloaded,
    /// Backend worker stopped.
    Unavailable,
}

/// Request metric event payload.
#[derive(Debug, Clone)]
pub struct RouterMetricEvent {
    /// HTTP method.
    pub method: String,
    /// Matched route pattern, when any.
    pub pattern: Option<String>,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// HTTP status code.
    pub status: u16,
    /// Number of rows returned.
    pub rows: usize,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for routed requests.
pub trait RouterMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: RouterMetricEvent);

    /// Records a latency observation for the request.
    fn record_latency(&self, event: RouterMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl RouterMetrics for NoopMetrics {
    fn record_request(&self, _event: RouterMetricEvent) {}

    fn record_latency(&self, _event: RouterMetricEvent, _latency: Duration) {}
}
