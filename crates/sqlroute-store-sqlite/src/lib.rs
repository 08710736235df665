// crates/sqlroute-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQL Route SQLite Store
// Description: Embedded SQLite query backend for SQL Route.
// Purpose: Bind request context, execute templates, and apply migrations.
// Dependencies: sqlroute-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteRouteStore`], a [`sqlroute_core::QueryBackend`]
//! that owns a single `SQLite` connection on a dedicated worker thread. Every
//! request binds its context relation, runs one template, and drops the
//! relation again before the next command is taken from the queue.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod binder;
pub mod executor;
pub mod migrations;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use binder::ContextBinding;
pub use binder::DEFAULT_CONTEXT_RELATION;
pub use binder::validate_relation_name;
pub use executor::execute_statement;
pub use migrations::MIGRATIONS_TABLE;
pub use migrations::MigrationError;
pub use migrations::MigrationRecord;
pub use migrations::applied_migrations;
pub use migrations::pending_migrations;
pub use migrations::run_migrations;
pub use store::DEFAULT_BUSY_TIMEOUT_MS;
pub use store::DEFAULT_QUEUE_CAPACITY;
pub use store::SqliteLocation;
pub use store::SqliteRouteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
