// crates/sqlroute-config/src/lib.rs
// ============================================================================
// Module: SQL Route Config Library
// Description: Configuration model and validation for sqlroute.toml.
// Purpose: Single source of truth for SQL Route runtime settings.
// Dependencies: serde, toml, sqlroute-store-sqlite
// ============================================================================

//! ## Overview
//! `sqlroute-config` loads `sqlroute.toml`, applies defaults, and validates
//! every section, failing closed on anything unexpected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
