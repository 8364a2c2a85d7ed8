//! Integration tests for the tiered-cli commands.
//!
//! These exercise the same code paths as the binary, using in-memory SQLite
//! databases for isolation and temp files for request fixtures.

use std::io::Write;
use std::sync::Arc;

use tiered_cli::commands;
use tiered_core::models::request::RequestType;
use tiered_core::state::{AppState, AppStateInner};
use tiered_core::{Database, TierClient, TieredConfig};

fn test_state() -> AppState {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    Arc::new(AppStateInner::new(
        db,
        TieredConfig::default(),
        commands::builtin_tools(),
    ))
}

fn request_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write request");
    file
}

#[test]
fn test_load_yaml_request_generates_execution_id() {
    let file = request_file(
        ".yaml",
        "type: routine\nuserId: u1\npayload:\n  inputs:\n    tool: echo\n    arguments:\n      q: x\n",
    );
    let request = commands::run::load_request(file.path().to_str().unwrap()).unwrap();
    assert_eq!(request.request_type(), RequestType::Routine);
    assert!(!request.execution_id.is_empty());
}

#[test]
fn test_load_invalid_request_is_error() {
    let file = request_file(".json", r#"{ "type": "swarm", "payload": {} }"#);
    let err = commands::run::load_request(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.starts_with("Invalid request"));
}

#[tokio::test]
async fn test_run_routine_tool_call() {
    let state = test_state();
    let file = request_file(
        ".json",
        r#"{ "type": "routine", "userId": "u1",
             "payload": { "inputs": { "tool": "echo", "arguments": { "q": "x" } } } }"#,
    );
    commands::run::run(&state, file.path().to_str().unwrap())
        .await
        .expect("routine run should succeed");
}

#[tokio::test]
async fn test_run_failed_step_returns_error() {
    let state = test_state();
    let file = request_file(
        ".json",
        r#"{ "type": "routine", "userId": "u1",
             "payload": { "stepType": "code_execution", "inputs": {} } }"#,
    );
    let err = commands::run::run(&state, file.path().to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.contains("No code provided for execution"));
}

#[tokio::test]
async fn test_swarm_start_then_status() {
    let state = test_state();
    commands::swarm::start(&state, "Draft the plan", None, Some("s-1".to_string()), None, "u1")
        .await
        .unwrap();
    assert_eq!(state.coordinator.get_status().await.active_executions, 1);

    commands::swarm::update_status(&state, "s-1", "completed").await.unwrap();
    assert_eq!(state.coordinator.get_status().await.active_executions, 0);

    assert!(commands::swarm::update_status(&state, "s-1", "exploded").await.is_err());
    assert!(commands::swarm::get(&state, "missing").await.is_err());
    commands::swarm::list(&state).await.unwrap();
}

#[test]
fn test_template_render_command() {
    let langs = vec!["fr".to_string()];
    let out = commands::template::render(
        "{{input.city}} in {{userLanguage}}",
        r#"{ "city": "Paris" }"#,
        &langs,
    )
    .unwrap();
    assert_eq!(out, "Paris in fr");

    let err = commands::template::render("{{input.city}}", "{}", &[]).unwrap_err();
    assert_eq!(err, "Input not found: city");
    assert!(commands::template::render("x", "[1]", &[]).is_err());
}
