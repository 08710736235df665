// crates/sqlroute-core/src/registry.rs
// ============================================================================
// Module: Route Registry
// Description: Owner of the live route table with atomic whole-table reload.
// Purpose: Serve lock-free snapshots to request handlers while allowing reload.
// Dependencies: arc-swap, crate::{table, templates}
// ============================================================================

//! ## Overview
//! The registry holds the current [`RouteTable`] behind an [`ArcSwap`].
//! Readers take an `Arc` snapshot and keep matching against it even if a
//! reload lands mid-request. Reload builds a complete new table first and only
//! then replaces the old one; a failed reload leaves the previous table live.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;

use crate::table::RouteTable;
use crate::templates::TemplateError;
use crate::templates::TemplateStore;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Explicitly owned route registry.
///
/// # Invariants
/// - `revision` increases by one for every successful swap.
#[derive(Debug)]
pub struct RouteRegistry {
    /// Loader used by [`RouteRegistry::reload`].
    store: TemplateStore,
    /// Current table.
    table: ArcSwap<RouteTable>,
    /// Number of tables published so far.
    revision: AtomicU64,
}

impl RouteRegistry {
    /// Loads the initial table from the store.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when the initial load fails.
    pub fn open(store: TemplateStore) -> Result<Self, TemplateError> {
        let table = store.load()?;
        Ok(Self::from_table(store, table))
    }

    /// Wraps an already built table.
    #[must_use]
    pub fn from_table(store: TemplateStore, table: RouteTable) -> Self {
        Self {
            store,
            table: ArcSwap::from_pointee(table),
            revision: AtomicU64::new(1),
        }
    }

    /// Returns the template store backing this registry.
    #[must_use]
    pub const fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Returns the current table.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Returns the current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Reloads templates and swaps the table in one step.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when loading fails; the previous table stays live.
    pub fn reload(&self) -> Result<u64, TemplateError> {
        let table = self.store.load()?;
        self.table.store(Arc::new(table));
        Ok(self.revision.fetch_add(1, Ordering::AcqRel) + 1)
    }
}
