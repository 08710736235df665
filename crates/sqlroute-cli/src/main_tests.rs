// crates/sqlroute-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and output rendering.
// Purpose: Ensure commands parse as documented and render stable text.
// Dependencies: sqlroute-cli main helpers
// ============================================================================

//! ## Overview
//! Validates clap wiring and the text renderers used by `routes` and `migrate`.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use clap::Parser;
use sqlroute_core::RoutePattern;
use sqlroute_core::RouteTableBuilder;
use sqlroute_core::Template;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::MigrateOutput;
use super::OutputFormat;
use super::render_migrate_text;
use super::render_routes_text;
use super::routes_output;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn migrate_parses_pending_and_format() {
    let cli = Cli::try_parse_from([
        "sqlroute",
        "migrate",
        "--config",
        "app/sqlroute.toml",
        "--pending",
        "--format",
        "json",
    ])
    .expect("parse");
    match cli.command {
        Commands::Migrate(command) => {
            assert!(command.pending);
            assert_eq!(command.format, OutputFormat::Json);
            assert_eq!(command.config.config, Some(PathBuf::from("app/sqlroute.toml")));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn config_validate_parses_without_path() {
    let cli = Cli::try_parse_from(["sqlroute", "config", "validate"]).expect("parse");
    match cli.command {
        Commands::Config {
            command: ConfigCommand::Validate(args),
        } => assert!(args.config.is_none()),
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn missing_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["sqlroute"]).is_err());
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn routes_text_aligns_sources_and_lists_ambiguities() {
    let mut builder = RouteTableBuilder::new();
    for (pattern, source) in [
        ("/users", "api/users/index.sql"),
        ("/users/:id", "api/users/:id.sql"),
        ("/users/:name", "api/users/:name.sql"),
    ] {
        builder
            .insert(Template::new(RoutePattern::new(pattern), PathBuf::from(source), "SELECT 1"))
            .expect("insert");
    }
    let output = routes_output(&builder.build());

    assert_eq!(
        render_routes_text(&output),
        "/users        api/users/index.sql\n/users/:id    api/users/:id.sql\n/users/:name  \
         api/users/:name.sql"
    );
    assert_eq!(output.ambiguities.len(), 1);
    assert_eq!(output.ambiguities[0].winner, "/users/:id");
    assert_eq!(output.ambiguities[0].shadowed, "/users/:name");
}

#[test]
fn empty_route_table_renders_placeholder() {
    let output = routes_output(&RouteTableBuilder::new().build());
    assert_eq!(render_routes_text(&output), "no routes");
}

#[test]
fn migrate_text_reports_verb_per_mode() {
    let applied = MigrateOutput {
        applied: true,
        migrations: vec!["001_users.sql".to_string(), "002_posts.sql".to_string()],
    };
    assert_eq!(render_migrate_text(&applied), "applied 001_users.sql\napplied 002_posts.sql");

    let pending = MigrateOutput {
        applied: false,
        migrations: vec!["003_tags.sql".to_string()],
    };
    assert_eq!(render_migrate_text(&pending), "pending 003_tags.sql");

    let none = MigrateOutput {
        applied: true,
        migrations: Vec::new(),
    };
    assert_eq!(render_migrate_text(&none), "no pending migrations");
}
