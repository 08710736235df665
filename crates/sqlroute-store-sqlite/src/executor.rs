// crates/sqlroute-store-sqlite/src/executor.rs
// ============================================================================
// Module: Query Executor
// Description: Runs template text verbatim and collects result rows.
// Purpose: Convert engine rows into JSON objects keyed by column name.
// Dependencies: base64, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Template text is prepared exactly as loaded; nothing is substituted. All
//! rows are collected eagerly. `BLOB` values are rendered as standard base64
//! text and non-finite `REAL` values as `null`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use sqlroute_core::QueryRows;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes one statement and returns every row it produces.
///
/// Statements without result columns return an empty row set.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Execution`] carrying the engine message.
pub fn execute_statement(connection: &Connection, sql: &str) -> Result<QueryRows, SqliteStoreError> {
    let mut statement = connection.prepare(sql).map_err(execution_error)?;
    let columns: Vec<String> =
        statement.column_names().into_iter().map(str::to_string).collect();
    let mut rows = statement.query([]).map_err(execution_error)?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next().map_err(execution_error)? {
        let mut object = Map::with_capacity(columns.len());
        for (index, name) in columns.iter().enumerate() {
            let value = row.get_ref(index).map_err(execution_error)?;
            object.insert(name.clone(), json_value(value));
        }
        collected.push(object);
    }
    Ok(collected)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an engine value to JSON.
fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

/// Wraps an engine error.
fn execution_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Execution(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
