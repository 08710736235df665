// crates/sqlroute-config/src/config.rs
// ============================================================================
// Module: SQL Route Configuration
// Description: TOML configuration model, resolution, and validation.
// Purpose: Load and validate server, template, database, and migration settings.
// Dependencies: serde, toml, thiserror, sqlroute-store-sqlite
// ============================================================================

//! ## Overview
//! The config path comes from the caller, then `SQLROUTE_CONFIG`, then
//! `sqlroute.toml` in the working directory. Relative paths inside the file
//! resolve against the directory that holds it. Unknown keys are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use sqlroute_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use sqlroute_store_sqlite::DEFAULT_CONTEXT_RELATION;
use sqlroute_store_sqlite::DEFAULT_QUEUE_CAPACITY;
use sqlroute_store_sqlite::SqliteLocation;
use sqlroute_store_sqlite::SqliteStoreConfig;
use sqlroute_store_sqlite::SqliteStoreMode;
use sqlroute_store_sqlite::SqliteSyncMode;
use sqlroute_store_sqlite::validate_relation_name;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "sqlroute.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SQLROUTE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default listen address.
const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Default request body limit.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Upper bound for the request body limit.
const MAX_BODY_BYTES_LIMIT: usize = 64 * 1024 * 1024;
/// Upper bound for the busy timeout (ms).
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Upper bound for the command queue capacity.
const MAX_QUEUE_CAPACITY: usize = 65_536;
/// Database path that selects an in-memory database.
const MEMORY_DATABASE_PATH: &str = ":memory:";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlRouteConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Template directory settings.
    pub templates: TemplatesConfig,
    /// Embedded database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Migration settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if let Some(path) = &self.audit.path {
            validate_path_field("server.audit.path", path)?;
        }
        Ok(())
    }
}

/// Audit log settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Enables audit events.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON-lines output file; stderr when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Template directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Root of the template tree.
    pub root: PathBuf,
}

/// Embedded database settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file; absent or `:memory:` selects an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Context relation name visible to templates.
    #[serde(default = "default_context_relation")]
    pub context_relation: String,
    /// Maximum queued requests before overload responses.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            context_relation: default_context_relation(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DatabaseConfig {
    /// Returns true when the database lives in memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path.as_deref().is_none_or(|path| path == Path::new(MEMORY_DATABASE_PATH))
    }

    /// Builds the store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        let location = match &self.path {
            Some(path) if !self.is_memory() => SqliteLocation::File(path.clone()),
            _ => SqliteLocation::Memory,
        };
        SqliteStoreConfig {
            location,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            context_relation: self.context_relation.clone(),
            queue_capacity: self.queue_capacity,
            ..SqliteStoreConfig::default()
        }
    }

    /// Validates database settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_relation_name(&self.context_relation).map_err(|err| {
            ConfigError::Invalid(format!("database.context_relation: {err}"))
        })?;
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "database.queue_capacity must be between 1 and {MAX_QUEUE_CAPACITY}"
            )));
        }
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "database.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        if let Some(path) = &self.path
            && !self.is_memory()
        {
            validate_path_field("database.path", path)?;
        }
        Ok(())
    }
}

/// Migration settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Directory of ordered `.sql` scripts.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Applies pending migrations before serving.
    #[serde(default = "default_true")]
    pub apply_on_start: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            apply_on_start: true,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl SqlRouteConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        if let Some(base) = resolved.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        validate_path_field("templates.root", &self.templates.root)?;
        self.database.validate()?;
        if let Some(dir) = &self.migrations.dir {
            validate_path_field("migrations.dir", dir)?;
        }
        Ok(())
    }

    /// Rebases relative paths onto `base`.
    fn resolve_relative_paths(&mut self, base: &Path) {
        rebase(base, &mut self.templates.root);
        if let Some(dir) = &mut self.migrations.dir {
            rebase(base, dir);
        }
        if let Some(path) = &mut self.server.audit.path {
            rebase(base, path);
        }
        if !self.database.is_memory()
            && let Some(path) = &mut self.database.path
        {
            rebase(base, path);
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path field.
fn validate_path_field(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} component too long")));
        }
    }
    Ok(())
}

/// Joins a relative path onto `base`.
fn rebase(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

/// Default listen address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default context relation name.
fn default_context_relation() -> String {
    DEFAULT_CONTEXT_RELATION.to_string()
}

/// Default queue capacity.
const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Serde default helper for `true`.
const fn default_true() -> bool {
    true
}
