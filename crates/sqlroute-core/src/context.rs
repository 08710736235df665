// crates/sqlroute-core/src/context.rs
// ============================================================================
// Module: Request Context
// Description: Per-request context record and inbound request parsing.
// Purpose: Capture params, query, headers, body, method, and path for binding.
// Dependencies: serde, serde_json, url
// ============================================================================

//! ## Overview
//! A [`RequestContext`] is built after a route matches, handed to exactly one
//! backend execution, then dropped. Its four structured fields are stored as
//! JSON text columns so templates can read them with the engine's JSON
//! functions; `method` and `path` are stored as plain text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content-type fragment that enables JSON body parsing.
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request data visible to a template through the context relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestContext {
    /// Path parameters bound by the matcher.
    pub params: BTreeMap<String, String>,
    /// Query-string parameters; the last duplicate wins.
    pub query: BTreeMap<String, String>,
    /// Request headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, `{}` when absent or unparseable.
    pub body: Value,
    /// HTTP method.
    pub method: String,
    /// Request path as received.
    pub path: String,
}

/// The six text column values of one context row, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextColumns {
    /// Params as JSON text.
    pub params: String,
    /// Query as JSON text.
    pub query: String,
    /// Headers as JSON text.
    pub headers: String,
    /// Body as JSON text.
    pub body: String,
    /// Method text.
    pub method: String,
    /// Path text.
    pub path: String,
}

impl ContextColumns {
    /// Column names in insertion order.
    pub const NAMES: [&'static str; 6] = ["params", "query", "headers", "body", "method", "path"];
}

impl RequestContext {
    /// Creates a context with empty maps and an empty-object body.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: empty_body(),
            method: method.into(),
            path: path.into(),
        }
    }

    /// Serializes the context into its column values.
    #[must_use]
    pub fn serialized(&self) -> ContextColumns {
        ContextColumns {
            params: map_json(&self.params),
            query: map_json(&self.query),
            headers: map_json(&self.headers),
            body: self.body.to_string(),
            method: self.method.clone(),
            path: self.path.clone(),
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Decodes a raw query string; duplicate keys keep the last value.
#[must_use]
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    let mut query = BTreeMap::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            query.insert(key.into_owned(), value.into_owned());
        }
    }
    query
}

/// Parses a request body as JSON when the content type asks for it.
///
/// Anything else, including empty or malformed JSON, yields `{}`.
#[must_use]
pub fn parse_body(content_type: Option<&str>, bytes: &[u8]) -> Value {
    let wants_json = content_type.is_some_and(|value| value.contains(JSON_CONTENT_TYPE));
    if !wants_json || bytes.is_empty() {
        return empty_body();
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| empty_body())
}

/// Collects headers with lower-cased names, joining repeats with `", "`.
#[must_use]
pub fn collect_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        collected
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the empty JSON object.
fn empty_body() -> Value {
    Value::Object(Map::new())
}

/// Renders a string map as a JSON object.
fn map_json(map: &BTreeMap<String, String>) -> String {
    let object: Map<String, Value> =
        map.iter().map(|(key, value)| (key.clone(), Value::String(value.clone()))).collect();
    Value::Object(object).to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
