//! Common utilities for proto-agent integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use proto_agent::conversation::{Conversation, FunctionCall, TokenUsage};
use proto_agent::provider::{ModelClient, ModelRequest, ModelResponse};
use tempfile::TempDir;

/// Temporary working directory for one test
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file (and its parent directories) relative to the workspace
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write temp file");
        file_path
    }

    pub fn create_dir(&self, name: &str) -> PathBuf {
        let dir_path = self.path().join(name);
        fs::create_dir_all(&dir_path).expect("Failed to create temp directory");
        dir_path
    }

    pub fn read_file(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("Failed to read temp file")
    }

    /// Command for the built binary, with every API key variable removed
    pub fn agent_command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_proto-agent"));
        command
            .current_dir(self.path())
            .env_remove("GEMINI_API_KEY")
            .env_remove("API_KEY")
            .env_remove("RUST_LOG")
            .env_remove("PROTO_AGENT_LOG_TO_FILE");
        command
    }
}

/// Model that replays a fixed script of turns
///
/// Every request's conversation is recorded so tests can inspect what the
/// model was shown.
#[derive(Debug)]
pub struct ScriptedModel {
    turns: VecDeque<ModelResponse>,
    seen: Arc<Mutex<Vec<Conversation>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ModelResponse>) -> (Self, Arc<Mutex<Vec<Conversation>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                turns: turns.into(),
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }

    /// Repeats the same tool call forever
    pub fn looping(call: FunctionCall, times: usize) -> (Self, Arc<Mutex<Vec<Conversation>>>) {
        let turns = (0..times)
            .map(|i| {
                let mut call = call.clone();
                call.call_id = format!("{}_{i}", call.call_id);
                tool_turn(vec![call])
            })
            .collect();
        Self::new(turns)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&mut self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        self.seen
            .lock()
            .expect("poisoned")
            .push(request.conversation.clone());
        self.turns
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted model has no more turns"))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "Test"
    }
}

pub fn tool_turn(calls: Vec<FunctionCall>) -> ModelResponse {
    ModelResponse::ToolCalls {
        text: None,
        calls,
        usage: TokenUsage::default(),
    }
}

pub fn final_turn(text: &str) -> ModelResponse {
    ModelResponse::Final {
        text: text.to_string(),
        usage: TokenUsage {
            prompt_tokens: Some(12),
            completion_tokens: Some(3),
            total_tokens: Some(15),
        },
    }
}
