// crates/sqlroute-core/src/templates.rs
// ============================================================================
// Module: Template Store
// Description: Recursive loader for SQL template directory trees.
// Purpose: Build an immutable route table from `.sql` files under a root.
// Dependencies: crate::{route, table}, thiserror
// ============================================================================

//! ## Overview
//! The template store walks a root directory, derives a route pattern for each
//! `.sql` file, and reads the full template text into memory. Directory
//! entries are visited in sorted order so repeated loads of the same tree yield
//! identical tables. Any failure aborts the load; no partial table escapes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::route::RoutePattern;
use crate::route::route_from_path;
use crate::table::RouteTable;
use crate::table::RouteTableBuilder;
use crate::table::Template;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Template loading errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template root is missing or cannot be listed.
    #[error("template root unreadable: {path}: {message}")]
    RootUnreadable {
        /// Root directory.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// A template file or nested directory cannot be read.
    #[error("template unreadable: {path}: {message}")]
    FileUnreadable {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O or decoding message.
        message: String,
    },
    /// Two template files derive the same route pattern.
    #[error("duplicate route {pattern}: {first} and {second}")]
    DuplicateRoute {
        /// Colliding pattern.
        pattern: String,
        /// File registered first.
        first: PathBuf,
        /// File rejected.
        second: PathBuf,
    },
    /// A file or directory name is not valid UTF-8.
    #[error("template path is not valid utf-8: {0}")]
    InvalidPath(PathBuf),
}

// ============================================================================
// SECTION: Template Store
// ============================================================================

/// Loader bound to one template root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStore {
    /// Root directory of the template tree.
    root: PathBuf,
}

impl TemplateStore {
    /// Creates a store for the given root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Returns the template root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every template under the root into a fresh route table.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when the root or any template cannot be read,
    /// when a name is not UTF-8, or when two files map to the same pattern.
    pub fn load(&self) -> Result<RouteTable, TemplateError> {
        let entries = sorted_entries(&self.root).map_err(|err| TemplateError::RootUnreadable {
            path: self.root.clone(),
            message: err.to_string(),
        })?;
        let mut builder = RouteTableBuilder::new();
        let mut directories = Vec::new();
        walk(entries, &mut directories, &mut builder)?;
        Ok(builder.build())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lists a directory with entries sorted by file name.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

/// Visits one directory level, recursing into subdirectories.
fn walk(
    entries: Vec<fs::DirEntry>,
    directories: &mut Vec<String>,
    builder: &mut RouteTableBuilder,
) -> Result<(), TemplateError> {
    for entry in entries {
        let path = entry.path();
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| TemplateError::InvalidPath(path.clone()))?;
        let file_type = entry.file_type().map_err(|err| unreadable(&path, &err))?;
        let is_dir = if file_type.is_symlink() {
            fs::metadata(&path).map_err(|err| unreadable(&path, &err))?.is_dir()
        } else {
            file_type.is_dir()
        };
        if is_dir {
            let nested = sorted_entries(&path).map_err(|err| unreadable(&path, &err))?;
            directories.push(name);
            walk(nested, directories, builder)?;
            directories.pop();
            continue;
        }
        let segments: Vec<&str> = directories.iter().map(String::as_str).collect();
        let Some(route) = route_from_path(&segments, &name) else {
            continue;
        };
        let text = fs::read_to_string(&path).map_err(|err| unreadable(&path, &err))?;
        builder.insert(Template::new(RoutePattern::new(&route), path, text))?;
    }
    Ok(())
}

/// Builds a file-level read error.
fn unreadable(path: &Path, err: &std::io::Error) -> TemplateError {
    TemplateError::FileUnreadable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
