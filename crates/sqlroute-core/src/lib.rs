// crates/sqlroute-core/src/lib.rs
// ============================================================================
// Module: SQL Route Core Library
// Description: Public API surface for the SQL Route core.
// Purpose: Expose route patterns, route tables, template loading, and request context.
// Dependencies: crate::{route, table, templates, registry, context, interfaces}
// ============================================================================

//! ## Overview
//! SQL Route core turns a directory tree of `.sql` templates into an immutable
//! route table, resolves inbound request paths against it, and describes the
//! per-request context handed to a query backend. It owns no database handle;
//! backends integrate through [`QueryBackend`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod interfaces;
pub mod registry;
pub mod route;
pub mod table;
pub mod templates;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::ContextColumns;
pub use context::RequestContext;
pub use context::collect_headers;
pub use context::parse_body;
pub use context::parse_query;
pub use interfaces::BackendError;
pub use interfaces::QueryBackend;
pub use interfaces::QueryRows;
pub use interfaces::SharedQueryBackend;
pub use registry::RouteRegistry;
pub use route::RoutePattern;
pub use route::RouteSegment;
pub use route::normalize_route;
pub use route::route_from_path;
pub use table::RouteAmbiguity;
pub use table::RouteMatch;
pub use table::RouteTable;
pub use table::RouteTableBuilder;
pub use table::Template;
pub use templates::TemplateError;
pub use templates::TemplateStore;
