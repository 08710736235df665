// crates/sqlroute-core/src/interfaces.rs
// ============================================================================
// Module: SQL Route Interfaces
// Description: Backend-agnostic contract for executing matched templates.
// Purpose: Decouple the HTTP surface from the embedded database backend.
// Dependencies: crate::context, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`QueryBackend`] executes one template against one request context and
//! returns every result row. Implementations own the context relation
//! lifecycle: the relation exists only while its request's statement runs and
//! is removed on every exit path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::context::RequestContext;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result rows, one JSON object per row keyed by column name.
pub type QueryRows = Vec<Map<String, Value>>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend errors surfaced to the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The context relation could not be created or populated.
    #[error("{0}")]
    Bind(String),
    /// The template statement failed.
    #[error("{0}")]
    Execution(String),
    /// The backend queue is full; the request may be retried.
    #[error("{message}")]
    Overloaded {
        /// Human-readable detail.
        message: String,
        /// Suggested retry delay.
        retry_after_ms: Option<u64>,
    },
    /// The backend is shut down or otherwise unusable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Backend Trait
// ============================================================================

/// Executes templates against a per-request context.
pub trait QueryBackend {
    /// Binds `context`, runs `template` verbatim, and releases the context.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when binding, execution, or release fails.
    fn execute(&self, template: &str, context: RequestContext) -> Result<QueryRows, BackendError>;

    /// Checks whether the backend can accept work.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend is unusable.
    fn readiness(&self) -> Result<(), BackendError>;
}

// ============================================================================
// SECTION: Shared Backend Wrapper
// ============================================================================

/// Query backend shared through an `Arc` trait object.
#[derive(Clone)]
pub struct SharedQueryBackend {
    /// Inner backend implementation.
    inner: Arc<dyn QueryBackend + Send + Sync>,
}

impl SharedQueryBackend {
    /// Wraps a backend in a shared, clonable wrapper.
    #[must_use]
    pub fn from_backend(backend: impl QueryBackend + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    /// Wraps an existing shared backend.
    #[must_use]
    pub const fn new(backend: Arc<dyn QueryBackend + Send + Sync>) -> Self {
        Self {
            inner: backend,
        }
    }
}

impl QueryBackend for SharedQueryBackend {
    fn execute(&self, template: &str, context: RequestContext) -> Result<QueryRows, BackendError> {
        self.inner.execute(template, context)
    }

    fn readiness(&self) -> Result<(), BackendError> {
        self.inner.readiness()
    }
}
