// crates/sqlroute-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Migration Runner
// Description: Applies ordered SQL migration scripts exactly once.
// Purpose: Track applied scripts in a metadata table and apply pending ones.
// Dependencies: rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Migration scripts are the `.sql` files directly inside one directory,
//! applied in lexicographic file-name order. Each script commits together
//! with its metadata row, so a script is either fully applied and recorded or
//! not at all. The first failure stops the run; earlier scripts stay
//! committed and the run can be repeated after the script is fixed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Metadata table recording applied migrations.
pub const MIGRATIONS_TABLE: &str = "migrations";
/// File-name suffix of migration scripts.
const SCRIPT_EXTENSION: &str = ".sql";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Script file name.
    pub name: String,
    /// Engine timestamp recorded at application time.
    pub applied_at: String,
}

/// Script discovered in the migrations directory.
struct MigrationScript {
    /// File name, used as the migration identity.
    name: String,
    /// Full path to the script.
    path: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Migration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// The migrations directory does not exist.
    #[error("migrations directory not found: {}", .0.display())]
    DirectoryMissing(PathBuf),
    /// The migrations directory or a script cannot be read.
    #[error("migration io error: {0}")]
    Io(String),
    /// Metadata bookkeeping failed.
    #[error("migration metadata error: {0}")]
    Db(String),
    /// A script failed; it was rolled back and later scripts were skipped.
    #[error("migration {name} failed: {message}")]
    ScriptFailed {
        /// Script file name.
        name: String,
        /// Engine message.
        message: String,
    },
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Applies every pending script in order and returns the applied names.
///
/// # Errors
///
/// Returns [`MigrationError`] when the directory is missing or unreadable,
/// when bookkeeping fails, or when a script fails.
pub fn run_migrations(connection: &mut Connection, dir: &Path) -> Result<Vec<String>, MigrationError> {
    ensure_migrations_table(connection)?;
    let applied = applied_names(connection)?;
    let scripts = list_scripts(dir)?;
    let mut newly_applied = Vec::new();
    for script in scripts.into_iter().filter(|script| !applied.contains(&script.name)) {
        let text = fs::read_to_string(&script.path)
            .map_err(|err| MigrationError::Io(format!("{}: {err}", script.path.display())))?;
        apply_script(connection, &script.name, &text)?;
        newly_applied.push(script.name);
    }
    Ok(newly_applied)
}

/// Lists scripts that have not been applied yet, without running them.
///
/// # Errors
///
/// Returns [`MigrationError`] when the directory or metadata cannot be read.
pub fn pending_migrations(connection: &Connection, dir: &Path) -> Result<Vec<String>, MigrationError> {
    let applied = if migrations_table_exists(connection)? {
        applied_names(connection)?
    } else {
        BTreeSet::new()
    };
    Ok(list_scripts(dir)?
        .into_iter()
        .map(|script| script.name)
        .filter(|name| !applied.contains(name))
        .collect())
}

/// Lists applied migrations in application order.
///
/// # Errors
///
/// Returns [`MigrationError::Db`] when the metadata table cannot be read.
pub fn applied_migrations(connection: &Connection) -> Result<Vec<MigrationRecord>, MigrationError> {
    if !migrations_table_exists(connection)? {
        return Ok(Vec::new());
    }
    let mut statement = connection
        .prepare(&format!(
            "SELECT name, CAST(applied_at AS TEXT) FROM {MIGRATIONS_TABLE} ORDER BY id"
        ))
        .map_err(db_error)?;
    let records = statement
        .query_map([], |row| {
            Ok(MigrationRecord {
                name: row.get(0)?,
                applied_at: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    Ok(records)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the metadata table when absent.
fn ensure_migrations_table(connection: &Connection) -> Result<(), MigrationError> {
    connection
        .execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );"
        ))
        .map_err(db_error)
}

/// Returns true when the metadata table exists.
fn migrations_table_exists(connection: &Connection) -> Result<bool, MigrationError> {
    let found: Option<i64> = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![MIGRATIONS_TABLE],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    Ok(found.is_some())
}

/// Reads the set of applied script names.
fn applied_names(connection: &Connection) -> Result<BTreeSet<String>, MigrationError> {
    let mut statement =
        connection.prepare(&format!("SELECT name FROM {MIGRATIONS_TABLE}")).map_err(db_error)?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(db_error)?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(db_error)?;
    Ok(names)
}

/// Lists `.sql` files directly inside `dir`, sorted by file name.
fn list_scripts(dir: &Path) -> Result<Vec<MigrationScript>, MigrationError> {
    if !dir.is_dir() {
        return Err(MigrationError::DirectoryMissing(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir)
        .map_err(|err| MigrationError::Io(format!("{}: {err}", dir.display())))?;
    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| MigrationError::Io(err.to_string()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(SCRIPT_EXTENSION) || !entry.path().is_file() {
            continue;
        }
        scripts.push(MigrationScript {
            name,
            path: entry.path(),
        });
    }
    scripts.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(scripts)
}

/// Runs one script and records it in a single transaction.
fn apply_script(connection: &mut Connection, name: &str, text: &str) -> Result<(), MigrationError> {
    let failed = |err: rusqlite::Error| MigrationError::ScriptFailed {
        name: name.to_string(),
        message: err.to_string(),
    };
    let tx = connection.transaction().map_err(failed)?;
    tx.execute_batch(text).map_err(failed)?;
    tx.execute(&format!("INSERT INTO {MIGRATIONS_TABLE} (name) VALUES (?1)"), params![name])
        .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Wraps a metadata error.
fn db_error(err: rusqlite::Error) -> MigrationError {
    MigrationError::Db(err.to_string())
}
