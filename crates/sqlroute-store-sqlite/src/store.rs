// crates/sqlroute-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Route Store
// Description: Single-connection SQLite backend behind a bounded command queue.
// Purpose: Serialize context binding, execution, and migrations on one handle.
// Dependencies: rusqlite, serde, sqlroute-core, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteRouteStore`] moves one `SQLite` connection into a dedicated worker
//! thread and talks to it over a bounded channel. Each command carries its
//! own response channel. Because the worker finishes bind, execute, and
//! release for one request before taking the next command, the single context
//! relation name is never shared by two in-flight requests. A full queue is
//! reported as [`SqliteStoreError::Overloaded`] instead of blocking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use serde::Serialize;
use sqlroute_core::BackendError;
use sqlroute_core::QueryBackend;
use sqlroute_core::QueryRows;
use sqlroute_core::RequestContext;
use thiserror::Error;

use crate::binder::ContextBinding;
use crate::binder::DEFAULT_CONTEXT_RELATION;
use crate::binder::validate_relation_name;
use crate::executor::execute_statement;
use crate::migrations::MigrationError;
use crate::migrations::MigrationRecord;
use crate::migrations::applied_migrations;
use crate::migrations::pending_migrations;
use crate::migrations::run_migrations;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default command queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_024;
/// Suggested retry delay returned on overload.
const DEFAULT_RETRY_AFTER_MS: u64 = 50;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Worker thread name.
const WORKER_THREAD_NAME: &str = "sqlroute-sqlite-worker";
/// Execution error for templates that leave a transaction open.
const LEFT_OPEN_TRANSACTION: &str = "template left a transaction open; it was rolled back";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SqliteLocation {
    /// Private in-memory database, discarded with the store.
    #[default]
    Memory,
    /// Database file on disk.
    File(PathBuf),
}

/// Configuration for the `SQLite` route store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteStoreConfig {
    /// Database location.
    pub location: SqliteLocation,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Journal mode (file databases only).
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    pub sync_mode: SqliteSyncMode,
    /// Context relation name visible to templates.
    pub context_relation: String,
    /// Maximum queued commands before requests are rejected.
    pub queue_capacity: usize,
    /// Retry hint attached to overload errors.
    pub retry_after_ms: u64,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            location: SqliteLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            context_relation: DEFAULT_CONTEXT_RELATION.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_after_ms: DEFAULT_RETRY_AFTER_MS,
        }
    }
}

impl SqliteStoreConfig {
    /// Returns a default configuration for a database file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: SqliteLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a field is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_relation_name(&self.context_relation)?;
        if self.queue_capacity == 0 {
            return Err(SqliteStoreError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if let SqliteLocation::File(path) = &self.location {
            validate_store_path(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error outside request execution.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
    /// Context relation could not be bound or released.
    #[error("{0}")]
    Bind(String),
    /// Template statement failed.
    #[error("{0}")]
    Execution(String),
    /// Migration run failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Command queue is full.
    #[error("{message}")]
    Overloaded {
        /// Human-readable detail.
        message: String,
        /// Suggested retry delay.
        retry_after_ms: Option<u64>,
    },
    /// Worker thread is gone.
    #[error("sqlite store unavailable: {0}")]
    Unavailable(String),
}

impl From<SqliteStoreError> for BackendError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Bind(message) => Self::Bind(message),
            SqliteStoreError::Execution(message) => Self::Execution(message),
            SqliteStoreError::Overloaded {
                message,
                retry_after_ms,
            } => Self::Overloaded {
                message,
                retry_after_ms,
            },
            SqliteStoreError::Unavailable(message) => Self::Unavailable(message),
            other => Self::Execution(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Work items handled by the worker thread.
enum StoreCommand {
    /// Bind the context, run a template, release the context.
    Execute {
        /// Template text.
        template: String,
        /// Request context to bind.
        context: RequestContext,
        /// Result channel.
        response: mpsc::Sender<Result<QueryRows, SqliteStoreError>>,
    },
    /// Run an unbound statement.
    Query {
        /// Statement text.
        sql: String,
        /// Result channel.
        response: mpsc::Sender<Result<QueryRows, SqliteStoreError>>,
    },
    /// Apply pending migrations.
    Migrate {
        /// Migrations directory.
        dir: PathBuf,
        /// Result channel.
        response: mpsc::Sender<Result<Vec<String>, SqliteStoreError>>,
    },
    /// List pending migrations.
    PendingMigrations {
        /// Migrations directory.
        dir: PathBuf,
        /// Result channel.
        response: mpsc::Sender<Result<Vec<String>, SqliteStoreError>>,
    },
    /// List applied migrations.
    AppliedMigrations {
        /// Result channel.
        response: mpsc::Sender<Result<Vec<MigrationRecord>, SqliteStoreError>>,
    },
    /// Lightweight liveness check of the connection.
    Readiness {
        /// Result channel.
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite` route store.
///
/// Clones share one worker; the worker exits when the last clone is dropped.
#[derive(Clone)]
pub struct SqliteRouteStore {
    /// Shared queue handle.
    gateway: Arc<StoreGateway>,
}

/// Bounded submission side of the worker queue.
struct StoreGateway {
    /// Channel into the worker.
    sender: SyncSender<StoreCommand>,
    /// Retry hint for overload responses.
    retry_after_ms: u64,
}

impl SqliteRouteStore {
    /// Opens the database and starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the configuration is invalid, the
    /// database cannot be opened, or the worker cannot be spawned.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        if let SqliteLocation::File(path) = &config.location {
            ensure_parent_dir(path)?;
        }
        let connection = open_connection(&config)?;
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
        let relation = config.context_relation.clone();
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(connection, &relation, &receiver))
            .map_err(|err| SqliteStoreError::Io(format!("failed to spawn sqlite worker: {err}")))?;
        Ok(Self {
            gateway: Arc::new(StoreGateway {
                sender,
                retry_after_ms: config.retry_after_ms,
            }),
        })
    }

    /// Binds `context`, runs `template`, and releases the context.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on bind, execution, release, or queue failure.
    pub fn execute_template(
        &self,
        template: &str,
        context: RequestContext,
    ) -> Result<QueryRows, SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::Execute {
            template: template.to_string(),
            context,
            response,
        })
    }

    /// Runs a statement without binding any context.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on execution or queue failure.
    pub fn query(&self, sql: &str) -> Result<QueryRows, SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::Query {
            sql: sql.to_string(),
            response,
        })
    }

    /// Applies pending migrations from `dir` and returns the applied names.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Migration`] when the run fails.
    pub fn run_migrations(&self, dir: &Path) -> Result<Vec<String>, SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::Migrate {
            dir: dir.to_path_buf(),
            response,
        })
    }

    /// Lists migrations in `dir` that have not been applied.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Migration`] when listing fails.
    pub fn pending_migrations(&self, dir: &Path) -> Result<Vec<String>, SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::PendingMigrations {
            dir: dir.to_path_buf(),
            response,
        })
    }

    /// Lists applied migrations in application order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Migration`] when the metadata cannot be read.
    pub fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::AppliedMigrations {
            response,
        })
    }

    /// Checks that the worker can run a statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the worker is unavailable.
    pub fn check_ready(&self) -> Result<(), SqliteStoreError> {
        self.gateway.request(|response| StoreCommand::Readiness {
            response,
        })
    }
}

impl QueryBackend for SqliteRouteStore {
    fn execute(&self, template: &str, context: RequestContext) -> Result<QueryRows, BackendError> {
        self.execute_template(template, context).map_err(BackendError::from)
    }

    fn readiness(&self) -> Result<(), BackendError> {
        self.check_ready().map_err(BackendError::from)
    }
}

impl StoreGateway {
    /// Enqueues a command and waits for its result.
    fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, SqliteStoreError>>) -> StoreCommand,
    ) -> Result<T, SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        match self.sender.try_send(build(response_tx)) {
            Ok(()) => {}
            Err(TrySendError::Full(_command)) => {
                return Err(SqliteStoreError::Overloaded {
                    message: "sqlite command queue full; retryable".to_string(),
                    retry_after_ms: Some(self.retry_after_ms),
                });
            }
            Err(TrySendError::Disconnected(_command)) => {
                return Err(SqliteStoreError::Unavailable(
                    "sqlite worker stopped".to_string(),
                ));
            }
        }
        response_rx.recv().map_err(|_| {
            SqliteStoreError::Unavailable("sqlite worker response channel closed".to_string())
        })?
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Processes commands one at a time until every sender is dropped.
fn worker_loop(mut connection: Connection, relation: &str, receiver: &Receiver<StoreCommand>) {
    while let Ok(command) = receiver.recv() {
        match command {
            StoreCommand::Execute {
                template,
                context,
                response,
            } => {
                let _ = response.send(execute_with_context(&connection, relation, &template, &context));
            }
            StoreCommand::Query {
                sql,
                response,
            } => {
                let _ = response.send(execute_statement(&connection, &sql));
            }
            StoreCommand::Migrate {
                dir,
                response,
            } => {
                let _ = response.send(run_migrations(&mut connection, &dir).map_err(Into::into));
            }
            StoreCommand::PendingMigrations {
                dir,
                response,
            } => {
                let _ = response.send(pending_migrations(&connection, &dir).map_err(Into::into));
            }
            StoreCommand::AppliedMigrations {
                response,
            } => {
                let _ = response.send(applied_migrations(&connection).map_err(Into::into));
            }
            StoreCommand::Readiness {
                response,
            } => {
                let checked = connection
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map(|_| ())
                    .map_err(|err| SqliteStoreError::Db(err.to_string()));
                let _ = response.send(checked);
            }
        }
    }
}

/// Runs one template inside a context binding.
///
/// A transaction left open by the template is rolled back before the release,
/// so the shared connection is back in autocommit mode for the next request.
/// The release always runs; an execution error wins over a release error.
fn execute_with_context(
    connection: &Connection,
    relation: &str,
    template: &str,
    context: &RequestContext,
) -> Result<QueryRows, SqliteStoreError> {
    let binding = ContextBinding::bind(connection, relation, context)?;
    let mut executed = execute_statement(connection, template);
    if !connection.is_autocommit() {
        let rolled_back = connection
            .execute_batch("ROLLBACK")
            .map_err(|err| SqliteStoreError::Execution(err.to_string()));
        executed = executed.and(rolled_back).and(Err(SqliteStoreError::Execution(
            LEFT_OPEN_TRANSACTION.to_string(),
        )));
    }
    let released = binding.release();
    let rows = executed?;
    released?;
    Ok(rows)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the database exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

/// Validates database paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("database path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "database path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "database path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens the connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = match &config.location {
        SqliteLocation::Memory => Connection::open_in_memory_with_flags(flags),
        SqliteLocation::File(path) => Connection::open_with_flags(path, flags),
    }
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies connection pragmas.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if matches!(config.location, SqliteLocation::File(_)) {
        connection
            .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
