// crates/sqlroute-core/tests/route_matching.rs
// ============================================================================
// Module: Route Matching Tests
// Description: Exact and parameterized resolution against built route tables.
// Purpose: Pin first-match ordering, segment-count rules, and ambiguity reports.
// Dependencies: sqlroute-core
// ============================================================================

//! ## Overview
//! Builds route tables in memory and checks how request paths resolve.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use sqlroute_core::RoutePattern;
use sqlroute_core::RouteTable;
use sqlroute_core::RouteTableBuilder;
use sqlroute_core::Template;
use sqlroute_core::TemplateError;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn table(routes: &[&str]) -> RouteTable {
    let mut builder = RouteTableBuilder::new();
    for route in routes {
        builder
            .insert(Template::new(
                RoutePattern::new(route),
                PathBuf::from(format!("{route}.sql")),
                format!("SELECT '{route}' AS route"),
            ))
            .expect("insert route");
    }
    builder.build()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn exact_match_has_no_params() {
    let routes = table(&["/users", "/users/:id"]);
    let matched = routes.match_path("/users").expect("match");
    assert_eq!(matched.template().pattern().as_str(), "/users");
    assert!(matched.params().is_empty());
}

#[test]
fn exact_match_beats_parameterized_pattern() {
    let routes = table(&["/users/:id", "/users/me"]);
    let matched = routes.match_path("/users/me").expect("match");
    assert_eq!(matched.template().pattern().as_str(), "/users/me");
    assert!(matched.params().is_empty());
}

#[test]
fn parameter_binds_raw_segment() {
    let routes = table(&["/users/:id"]);
    let matched = routes.match_path("/users/42").expect("match");
    assert_eq!(matched.params().get("id").map(String::as_str), Some("42"));

    let encoded = routes.match_path("/users/a%20b").expect("match");
    assert_eq!(encoded.params().get("id").map(String::as_str), Some("a%20b"));
}

#[test]
fn multiple_parameters_bind_by_name() {
    let routes = table(&["/posts/:post/comments/:comment"]);
    let matched = routes.match_path("/posts/7/comments/9").expect("match");
    assert_eq!(matched.params().get("post").map(String::as_str), Some("7"));
    assert_eq!(matched.params().get("comment").map(String::as_str), Some("9"));
}

#[test]
fn segment_count_must_match() {
    let routes = table(&["/users/:id"]);
    assert!(routes.match_path("/users/42/extra").is_none());
    assert!(routes.match_path("/users").is_none());
    assert!(routes.match_path("/users/42/").is_none());
}

#[test]
fn literal_segments_must_match_exactly() {
    let routes = table(&["/users/:id/posts"]);
    assert!(routes.match_path("/users/42/comments").is_none());
    assert!(routes.match_path("/Users/42/posts").is_none());
}

#[test]
fn literal_patterns_never_match_dynamically() {
    let routes = table(&["/users/list"]);
    assert!(routes.match_path("/users/other").is_none());
    assert!(routes.match_path("/users//list").is_none());
}

#[test]
fn first_parameterized_pattern_in_table_order_wins() {
    let routes = table(&["/:kind/42", "/users/:id"]);
    let matched = routes.match_path("/users/42").expect("match");
    assert_eq!(matched.template().pattern().as_str(), "/:kind/42");
    assert_eq!(matched.params().get("kind").map(String::as_str), Some("users"));
}

#[test]
fn unknown_path_is_none() {
    let routes = table(&["/users", "/users/:id"]);
    assert!(routes.match_path("/nope").is_none());
    assert!(RouteTable::default().match_path("/").is_none());
}

#[test]
fn duplicate_pattern_is_rejected() {
    let mut builder = RouteTableBuilder::new();
    builder
        .insert(Template::new(RoutePattern::new("/users"), PathBuf::from("users.sql"), "SELECT 1"))
        .expect("first insert");
    let err = builder
        .insert(Template::new(
            RoutePattern::new("/users"),
            PathBuf::from("users/index.sql"),
            "SELECT 2",
        ))
        .expect_err("duplicate");
    match err {
        TemplateError::DuplicateRoute {
            pattern,
            ..
        } => assert_eq!(pattern, "/users"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn ambiguities_report_overlapping_parameterized_pairs() {
    let routes = table(&["/:kind/42", "/users/:id", "/posts/:id", "/users"]);
    let ambiguities = routes.ambiguities();
    assert_eq!(ambiguities.len(), 2);
    assert_eq!(ambiguities[0].winner.as_str(), "/:kind/42");
    assert_eq!(ambiguities[0].shadowed.as_str(), "/users/:id");
    assert_eq!(ambiguities[1].shadowed.as_str(), "/posts/:id");
}

#[test]
fn disjoint_patterns_have_no_ambiguity() {
    let routes = table(&["/users/:id", "/posts/:id", "/users/:id/posts"]);
    assert!(routes.ambiguities().is_empty());
}
