//! Integration tests for the agentflow-cli commands.
//!
//! These tests exercise the same code paths as the binary, using in-memory
//! SQLite databases and a scripted model backend for isolation.

use async_trait::async_trait;
use std::sync::Arc;

use agentflow_cli::commands::{self, StateOptions};
use agentflow_core::backend::{BackendRegistry, LlmBackend};
use agentflow_core::models::{Chat, ChatResult, Message};
use agentflow_core::state::{AppState, AppStateInner};
use agentflow_core::{Database, EngineConfig, FlowError};

struct Upper;

#[async_trait]
impl LlmBackend for Upper {
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError> {
        let last = chat.last_message().map(|m| m.content.to_uppercase()).unwrap_or_default();
        Ok(ChatResult::new(Message::assistant(last), chat.model.clone()))
    }

    async fn ask_memory(&self, chat: &Chat, _memory: &[String]) -> Result<ChatResult, FlowError> {
        self.send(chat).await
    }
}

/// Create an in-memory AppState for testing.
fn test_state(dir: &tempfile::TempDir) -> AppState {
    let db = Database::open(":memory:").expect("Failed to open in-memory database");
    let config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    Arc::new(AppStateInner::with_backends(
        db,
        config,
        Some(BackendRegistry::new(Arc::new(Upper))),
    ))
}

const FLOW_YAML: &str = r#"
name: "shout"
description: "Repeats louder"
agents:
  - id: caller
    name: Caller
    model: m
    order: 0
    steps: [START, ANSWER, "REDIRECT+echo+AS_Output"]
    relations: [echo]
  - id: echo
    name: Echo
    model: m
    order: 1
    steps: [ANSWER]
"#;

fn write_flow(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("shout.yaml");
    std::fs::write(&path, FLOW_YAML).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_flow_validate() {
    let dir = tempfile::tempdir().unwrap();
    assert!(commands::flow::validate(&write_flow(&dir)).is_ok());

    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "name: x\nagents:\n  - name: a\n    model: m\n    steps: [DANCE]\n").unwrap();
    let err = commands::flow::validate(&bad.to_string_lossy()).unwrap_err();
    assert!(err.contains("DANCE"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_flow_create_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let flow_id = commands::flow::create(&state, &write_flow(&dir)).await.unwrap();
    commands::flow::run(&state, None, Some(&flow_id), "hi").await.unwrap();

    let caller = state.agent_service.get_chat("caller").await.unwrap();
    assert_eq!(caller.last_message().unwrap().content, "HI");
    let echo = state.agent_service.get_chat("echo").await.unwrap();
    assert_eq!(echo.last_message().unwrap().content, "HI");

    commands::flow::list(&state).await.unwrap();
    commands::agent::list(&state).await.unwrap();
}

#[tokio::test]
async fn test_flow_run_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    commands::flow::run(&state, Some(&write_flow(&dir)), None, "hey")
        .await
        .unwrap();
    assert_eq!(state.flow_service.flows().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_flow_run_requires_target() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    assert!(commands::flow::run(&state, None, None, "hi").await.is_err());
}

#[tokio::test]
async fn test_flow_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let flow_id = commands::flow::create(&state, &write_flow(&dir)).await.unwrap();

    let archive = dir.path().join("out").join("shout-copy.zip");
    let archive = archive.to_string_lossy().to_string();
    commands::flow::save(&state, &flow_id, &archive).await.unwrap();
    commands::flow::delete(&state, &flow_id).await.unwrap();
    assert!(state.flow_service.flows().await.unwrap().is_empty());

    commands::flow::load(&state, &archive).await.unwrap();
    let flows = state.flow_service.flows().await.unwrap();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].name, "shout-copy");
}

#[tokio::test]
async fn test_agent_send_restart_delete() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    commands::flow::create(&state, &write_flow(&dir)).await.unwrap();

    commands::agent::send(&state, "echo", "quiet").await.unwrap();
    commands::agent::chat(&state, "echo").await.unwrap();
    let chat = state.agent_service.get_chat("echo").await.unwrap();
    assert_eq!(chat.last_message().unwrap().content, "QUIET");

    commands::agent::restart(&state, "echo").await.unwrap();
    let chat = state.agent_service.get_chat("echo").await.unwrap();
    assert_eq!(chat.messages.len(), 1);

    commands::agent::delete(&state, "echo").await.unwrap();
    assert!(commands::agent::delete(&state, "echo").await.is_err());
    assert!(commands::agent::send(&state, "echo", "gone?").await.is_err());
}

#[test]
fn test_load_config_applies_data_dir_override() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("engine.yaml");
    std::fs::write(&config_path, "max_redirect_depth: 3\nhttp_timeout_secs: 5\n").unwrap();

    let config = commands::load_config(&StateOptions {
        db: None,
        config: Some(config_path.to_string_lossy().to_string()),
        data_dir: Some("/tmp/agentflow-test".into()),
    })
    .unwrap();
    assert_eq!(config.max_redirect_depth, 3);
    assert_eq!(config.http_timeout_secs, 5);
    assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/agentflow-test"));
}

#[test]
fn test_init_state_creates_database_in_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let state = commands::init_state(&StateOptions {
        data_dir: Some(data_dir.to_string_lossy().to_string()),
        ..StateOptions::default()
    })
    .unwrap();
    assert_eq!(state.config.data_dir, data_dir);
    assert!(data_dir.join("agentflow.db").exists());
}
