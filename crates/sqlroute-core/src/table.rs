// crates/sqlroute-core/src/table.rs
// ============================================================================
// Module: Route Table
// Description: Immutable mapping from route patterns to SQL template text.
// Purpose: Resolve inbound request paths to a template and its path params.
// Dependencies: crate::route, serde
// ============================================================================

//! ## Overview
//! A [`RouteTable`] is built once from loaded templates and never mutated.
//! Matching tries an exact pattern lookup first, then scans parameterized
//! patterns in table order; the first pattern that binds a parameter wins.
//! There is no specificity ranking, so [`RouteTable::ambiguities`] exists to
//! flag pattern pairs whose outcome depends on that order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::route::RoutePattern;
use crate::templates::TemplateError;

// ============================================================================
// SECTION: Templates
// ============================================================================

/// One loaded SQL template and the pattern it answers.
///
/// # Invariants
/// - `text` is stored verbatim; it is never parsed or validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Route pattern derived from the template path.
    pattern: RoutePattern,
    /// File the template was read from.
    source: PathBuf,
    /// SQL text.
    text: Arc<str>,
}

impl Template {
    /// Creates a template record.
    #[must_use]
    pub fn new(pattern: RoutePattern, source: PathBuf, text: impl Into<Arc<str>>) -> Self {
        Self {
            pattern,
            source,
            text: text.into(),
        }
    }

    /// Returns the route pattern.
    #[must_use]
    pub const fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Returns the template source path.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

// ============================================================================
// SECTION: Match Results
// ============================================================================

/// Successful route resolution.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Matched template.
    template: Arc<Template>,
    /// Bound path parameters (empty for exact matches).
    params: BTreeMap<String, String>,
}

impl RouteMatch {
    /// Returns the matched template.
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Returns the bound path parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Splits the match into its shared template and parameters.
    #[must_use]
    pub fn into_parts(self) -> (Arc<Template>, BTreeMap<String, String>) {
        (self.template, self.params)
    }
}

/// Two parameterized patterns that can both match one concrete path.
///
/// `winner` precedes `shadowed` in table order and therefore always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteAmbiguity {
    /// Pattern matched first for overlapping paths.
    pub winner: RoutePattern,
    /// Pattern that never matches where the two overlap.
    pub shadowed: RoutePattern,
}

// ============================================================================
// SECTION: Route Table
// ============================================================================

/// Immutable route table.
///
/// # Invariants
/// - Each normalized pattern maps to exactly one template.
/// - Entry order is the iteration order used by the parameterized scan.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// Templates in table order.
    entries: Vec<Arc<Template>>,
    /// Exact lookup from pattern text to entry index.
    by_pattern: HashMap<String, usize>,
}

impl RouteTable {
    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates templates in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.entries.iter().map(AsRef::as_ref)
    }

    /// Looks up a template by exact pattern text.
    #[must_use]
    pub fn get(&self, pattern: &str) -> Option<&Template> {
        self.by_pattern
            .get(pattern)
            .and_then(|index| self.entries.get(*index))
            .map(AsRef::as_ref)
    }

    /// Resolves a request path to a template and its path parameters.
    ///
    /// Returns `None` when nothing matches; callers answer "route not found".
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        if let Some(template) = self.by_pattern.get(path).and_then(|index| self.entries.get(*index))
        {
            return Some(RouteMatch {
                template: Arc::clone(template),
                params: BTreeMap::new(),
            });
        }
        self.entries.iter().filter(|template| template.pattern().has_params()).find_map(
            |template| {
                template.pattern().bind(path).filter(|params| !params.is_empty()).map(|params| {
                    RouteMatch {
                        template: Arc::clone(template),
                        params,
                    }
                })
            },
        )
    }

    /// Lists parameterized pattern pairs whose match depends on table order.
    #[must_use]
    pub fn ambiguities(&self) -> Vec<RouteAmbiguity> {
        let dynamic: Vec<&RoutePattern> = self
            .entries
            .iter()
            .map(|template| template.pattern())
            .filter(|pattern| pattern.has_params())
            .collect();
        let mut found = Vec::new();
        for (index, winner) in dynamic.iter().enumerate() {
            for shadowed in dynamic.iter().skip(index + 1) {
                if winner.overlaps(shadowed) {
                    found.push(RouteAmbiguity {
                        winner: (*winner).clone(),
                        shadowed: (*shadowed).clone(),
                    });
                }
            }
        }
        found
    }
}

/// Builder that enforces one template per pattern.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    /// Table under construction.
    table: RouteTable,
}

impl RouteTableBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::DuplicateRoute`] when the pattern is already
    /// registered.
    pub fn insert(&mut self, template: Template) -> Result<(), TemplateError> {
        let key = template.pattern().as_str().to_string();
        if let Some(existing) = self.table.get(&key) {
            return Err(TemplateError::DuplicateRoute {
                pattern: key,
                first: existing.source().to_path_buf(),
                second: template.source().to_path_buf(),
            });
        }
        self.table.by_pattern.insert(key, self.table.entries.len());
        self.table.entries.push(Arc::new(template));
        Ok(())
    }

    /// Finishes the table.
    #[must_use]
    pub fn build(self) -> RouteTable {
        self.table
    }
}
