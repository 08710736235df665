// crates/sqlroute-store-sqlite/src/binder.rs
// ============================================================================
// Module: Context Binder
// Description: Creates and removes the per-request context relation.
// Purpose: Expose request data to templates as a one-row table.
// Dependencies: rusqlite, sqlroute-core
// ============================================================================

//! ## Overview
//! [`ContextBinding::bind`] drops any stale context relation, recreates it
//! with six text columns, and inserts exactly one row built from the request.
//! The returned guard removes the relation on [`ContextBinding::release`] or,
//! failing that, when it is dropped. A failed bind also attempts removal
//! before reporting the error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;
use sqlroute_core::ContextColumns;
use sqlroute_core::RequestContext;

use crate::migrations::MIGRATIONS_TABLE;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default context relation name.
pub const DEFAULT_CONTEXT_RELATION: &str = "request_context";
/// Maximum context relation name length.
const MAX_RELATION_NAME_LENGTH: usize = 64;
/// Reserved `SQLite` object-name prefix.
const RESERVED_PREFIX: &str = "sqlite_";

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a context relation name.
///
/// Names must be plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`), must not use
/// the reserved `sqlite_` prefix, and must not collide with the migrations
/// table.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] when the name is rejected.
pub fn validate_relation_name(name: &str) -> Result<(), SqliteStoreError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SqliteStoreError::Invalid("context relation name is empty".to_string()));
    };
    if name.len() > MAX_RELATION_NAME_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "context relation name exceeds {MAX_RELATION_NAME_LENGTH} characters"
        )));
    }
    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(SqliteStoreError::Invalid(format!(
            "context relation name is not an identifier: {name}"
        )));
    }
    let lowered = name.to_ascii_lowercase();
    if lowered == MIGRATIONS_TABLE || lowered.starts_with(RESERVED_PREFIX) {
        return Err(SqliteStoreError::Invalid(format!(
            "context relation name is reserved: {name}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Binding Guard
// ============================================================================

/// Live context relation for one request.
///
/// # Invariants
/// - While the guard exists the relation holds exactly one row.
/// - The relation is dropped exactly once, by `release` or by `Drop`.
#[derive(Debug)]
pub struct ContextBinding<'conn> {
    /// Connection the relation lives on.
    connection: &'conn Connection,
    /// Relation name.
    relation: &'conn str,
    /// True once the relation has been dropped.
    released: bool,
}

impl<'conn> ContextBinding<'conn> {
    /// Creates the context relation and inserts the request row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Bind`] when any step fails; removal of the
    /// partial relation is attempted first.
    pub fn bind(
        connection: &'conn Connection,
        relation: &'conn str,
        context: &RequestContext,
    ) -> Result<Self, SqliteStoreError> {
        let mut binding = Self {
            connection,
            relation,
            released: false,
        };
        if let Err(err) = binding.populate(context) {
            let _ = binding.drop_relation();
            binding.released = true;
            return Err(err);
        }
        Ok(binding)
    }

    /// Drops the relation and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Bind`] when the drop statement fails.
    pub fn release(mut self) -> Result<(), SqliteStoreError> {
        self.released = true;
        self.drop_relation()
    }

    /// Recreates the relation and inserts the row.
    fn populate(&self, context: &RequestContext) -> Result<(), SqliteStoreError> {
        self.drop_relation()?;
        let relation = self.relation;
        let typed = ContextColumns::NAMES.map(|name| format!("{name} TEXT")).join(", ");
        self.connection
            .execute_batch(&format!("CREATE TABLE \"{relation}\" ({typed});"))
            .map_err(|err| SqliteStoreError::Bind(err.to_string()))?;
        let names = ContextColumns::NAMES.join(", ");
        let columns = context.serialized();
        self.connection
            .execute(
                &format!(
                    "INSERT INTO \"{relation}\" ({names}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    columns.params,
                    columns.query,
                    columns.headers,
                    columns.body,
                    columns.method,
                    columns.path
                ],
            )
            .map_err(|err| SqliteStoreError::Bind(err.to_string()))?;
        Ok(())
    }

    /// Issues the drop statement.
    fn drop_relation(&self) -> Result<(), SqliteStoreError> {
        self.connection
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", self.relation))
            .map_err(|err| SqliteStoreError::Bind(err.to_string()))
    }
}

impl Drop for ContextBinding<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.drop_relation();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use rusqlite::Connection;
    use sqlroute_core::RequestContext;

    use super::ContextBinding;
    use super::validate_relation_name;

    fn relation_exists(connection: &Connection, name: &str) -> bool {
        connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            > 0
    }

    #[test]
    fn relation_names_are_validated() {
        assert!(validate_relation_name("request_context").is_ok());
        assert!(validate_relation_name("_ctx2").is_ok());
        assert!(validate_relation_name("").is_err());
        assert!(validate_relation_name("2ctx").is_err());
        assert!(validate_relation_name("ctx; DROP TABLE users").is_err());
        assert!(validate_relation_name("Migrations").is_err());
        assert!(validate_relation_name("sqlite_ctx").is_err());
    }

    #[test]
    fn bind_inserts_single_row_and_release_drops() {
        let connection = Connection::open_in_memory().unwrap();
        let mut context = RequestContext::new("POST", "/users/7");
        context.params.insert("id".to_string(), "7".to_string());

        let binding = ContextBinding::bind(&connection, "request_context", &context).unwrap();
        let (count, id, method): (i64, String, String) = connection
            .query_row(
                "SELECT COUNT(*), json_extract(params, '$.id'), method FROM request_context",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(id, "7");
        assert_eq!(method, "POST");

        binding.release().unwrap();
        assert!(!relation_exists(&connection, "request_context"));
    }

    #[test]
    fn dropped_guard_removes_relation() {
        let connection = Connection::open_in_memory().unwrap();
        let context = RequestContext::new("GET", "/");
        {
            let _binding = ContextBinding::bind(&connection, "ctx", &context).unwrap();
            assert!(relation_exists(&connection, "ctx"));
        }
        assert!(!relation_exists(&connection, "ctx"));
    }

    #[test]
    fn stale_relation_is_replaced() {
        let connection = Connection::open_in_memory().unwrap();
        connection.execute_batch("CREATE TABLE ctx (other TEXT); INSERT INTO ctx VALUES ('x');").unwrap();
        let context = RequestContext::new("GET", "/fresh");
        let binding = ContextBinding::bind(&connection, "ctx", &context).unwrap();
        let path: String =
            connection.query_row("SELECT path FROM ctx", [], |row| row.get(0)).unwrap();
        assert_eq!(path, "/fresh");
        binding.release().unwrap();
    }
}
