// crates/sqlroute-core/src/route.rs
// ============================================================================
// Module: Route Patterns
// Description: Route pattern derivation, normalization, and segment matching.
// Purpose: Map template file paths to normalized, component-wise route patterns.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A route pattern is a normalized, slash-separated path template. Each
//! segment is either a literal or a named parameter (`:name`). Patterns are
//! compared segment by segment and never as raw strings with wildcards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::Serializer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker prefix identifying a parameter segment.
pub const PARAM_MARKER: char = ':';
/// File-name suffix marking a SQL template.
pub const TEMPLATE_EXTENSION: &str = ".sql";
/// Template file that binds to its containing directory.
pub const INDEX_FILE_NAME: &str = "index.sql";

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Collapses redundant slashes and forces exactly one leading slash.
///
/// Trailing slashes are preserved; an empty input becomes `/`.
#[must_use]
pub fn normalize_route(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len() + 1);
    normalized.push('/');
    for ch in raw.chars() {
        if ch == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(ch);
    }
    normalized
}

/// Derives the normalized route for a template file.
///
/// `directories` are the path components between the template root and the
/// file. Returns `None` when `file_name` is not a SQL template.
#[must_use]
pub fn route_from_path(directories: &[&str], file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(TEMPLATE_EXTENSION)?;
    let mut route = String::new();
    for directory in directories {
        route.push('/');
        route.push_str(directory);
    }
    if file_name != INDEX_FILE_NAME {
        route.push('/');
        route.push_str(stem);
    }
    Some(normalize_route(&route))
}

// ============================================================================
// SECTION: Pattern Types
// ============================================================================

/// A single route pattern segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RouteSegment {
    /// Segment that must match the request segment exactly.
    Literal(String),
    /// Segment that binds the request segment under the given name.
    Param(String),
}

impl RouteSegment {
    /// Classifies one raw pattern segment.
    fn parse(raw: &str) -> Self {
        raw.strip_prefix(PARAM_MARKER)
            .map_or_else(|| Self::Literal(raw.to_string()), |name| Self::Param(name.to_string()))
    }
}

/// Normalized route pattern derived from a template path.
///
/// # Invariants
/// - `raw` always starts with exactly one `/` and contains no `//`.
/// - `segments` is `raw` split on `/`, so the first segment is the empty literal.
/// - Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutePattern {
    /// Normalized pattern text.
    raw: String,
    /// Parsed segments, including the leading empty segment.
    segments: Vec<RouteSegment>,
}

impl RoutePattern {
    /// Builds a pattern from route text, normalizing it first.
    #[must_use]
    pub fn new(route: &str) -> Self {
        let raw = normalize_route(route);
        let segments = raw.split('/').map(RouteSegment::parse).collect();
        Self {
            raw,
            segments,
        }
    }

    /// Returns the normalized pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    /// Returns true when the pattern has at least one parameter segment.
    #[must_use]
    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|segment| matches!(segment, RouteSegment::Param(_)))
    }

    /// Returns parameter names in segment order.
    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                RouteSegment::Param(name) => Some(name.as_str()),
                RouteSegment::Literal(_) => None,
            })
            .collect()
    }

    /// Binds a request path against this pattern segment by segment.
    ///
    /// Returns `None` when the segment counts differ or any literal segment
    /// differs. Parameter values are the raw request segments.
    #[must_use]
    pub fn bind(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let request_segments: Vec<&str> = path.split('/').collect();
        if request_segments.len() != self.segments.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (segment, value) in self.segments.iter().zip(request_segments) {
            match segment {
                RouteSegment::Param(name) => {
                    params.insert(name.clone(), value.to_string());
                }
                RouteSegment::Literal(literal) => {
                    if literal != value {
                        return None;
                    }
                }
            }
        }
        Some(params)
    }

    /// Returns true when some concrete path could bind both patterns.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (RouteSegment::Literal(left), RouteSegment::Literal(right)) => left == right,
                _ => true,
            })
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for RoutePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
