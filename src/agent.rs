//! The agent loop.
//!
//! One [`Agent::generate`] call owns a conversation and alternates between
//! asking the model for its next turn and dispatching the tool calls it
//! proposes, strictly in order, until the model answers without tool calls.
//! Calls that need human approval suspend the loop: `generate` returns
//! [`AgentOutcome::NeedsConfirmation`] and the caller continues it with
//! [`Agent::resume`].

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::confirmation::{ConfirmationRequest, Confirmer, Decision};
use crate::constants::{DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, RUN_SCRIPT_TOOL, SYSTEM_PROMPT};
use crate::conversation::{Conversation, FunctionCall, FunctionResponse, Message, TokenUsage};
use crate::logging::{log_debug, log_error, log_info};
use crate::provider::{ModelClient, ModelRequest, ModelResponse};
use crate::tools::{ToolDescriptor, ToolExecutor, ToolRegistry};

/// Failures that end a `generate` call
///
/// Tool-level problems never show up here; they are reported to the model
/// as error responses instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Maximum function call iterations ({max_iterations}) exceeded")]
    IterationsExhausted { max_iterations: usize },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model request failed: {0:#}")]
    Model(anyhow::Error),
}

#[derive(Clone)]
pub struct AgentConfig {
    api_key: String,
    model: String,
    working_root: PathBuf,
    max_iterations: usize,
    verbose: bool,
    allow_exec: bool,
    confirm_tools: BTreeSet<String>,
    system_instruction: String,
}

impl AgentConfig {
    /// The working directory is canonicalized here, once; it must exist
    pub fn new(api_key: impl Into<String>, working_directory: impl AsRef<Path>) -> Result<Self> {
        let dir = working_directory.as_ref();
        let working_root = dir
            .canonicalize()
            .with_context(|| format!("Working directory {} does not exist", dir.display()))?;

        if !working_root.is_dir() {
            anyhow::bail!("Working directory {} is not a directory", dir.display());
        }

        Ok(Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            working_root,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            verbose: false,
            allow_exec: false,
            confirm_tools: BTreeSet::from([RUN_SCRIPT_TOOL.to_string()]),
            system_instruction: SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Skip the confirmation gate entirely
    pub fn with_allow_exec(mut self, allow_exec: bool) -> Self {
        self.allow_exec = allow_exec;
        self
    }

    /// Replace the set of tool names that need approval before running
    pub fn with_confirm_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.confirm_tools = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn allow_exec(&self) -> bool {
        self.allow_exec
    }

    pub fn confirm_tools(&self) -> &BTreeSet<String> {
        &self.confirm_tools
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("working_root", &self.working_root)
            .field("max_iterations", &self.max_iterations)
            .field("verbose", &self.verbose)
            .field("allow_exec", &self.allow_exec)
            .field("confirm_tools", &self.confirm_tools)
            .finish()
    }
}

/// Final answer of a completed `generate` call
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub usage: TokenUsage,
    /// Full history, including every tool call and result
    pub conversation: Conversation,
    /// Number of tool rounds dispatched before the final answer
    pub iterations: usize,
}

#[derive(Debug)]
pub enum AgentOutcome {
    Completed(AgentResponse),
    NeedsConfirmation(PendingConfirmation),
}

/// A suspended `generate` call waiting on one approval decision
#[derive(Debug)]
pub struct PendingConfirmation {
    request: ConfirmationRequest,
    session: Session,
}

impl PendingConfirmation {
    pub fn request(&self) -> &ConfirmationRequest {
        &self.request
    }
}

#[derive(Debug)]
struct Session {
    conversation: Conversation,
    iterations: usize,
    batch: Option<ToolBatch>,
}

/// Tool calls of one model turn and the results gathered so far
#[derive(Debug)]
struct ToolBatch {
    calls: Vec<FunctionCall>,
    responses: Vec<FunctionResponse>,
}

impl ToolBatch {
    fn new(calls: Vec<FunctionCall>) -> Result<Self, AgentError> {
        if calls.is_empty() {
            return Err(AgentError::MalformedResponse("tool call batch is empty".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = calls.iter().find(|c| !seen.insert(c.call_id.as_str())) {
            return Err(AgentError::MalformedResponse(format!(
                "duplicate tool call id '{}'",
                dup.call_id
            )));
        }

        Ok(Self {
            responses: Vec::with_capacity(calls.len()),
            calls,
        })
    }

    fn next_call(&self) -> Option<&FunctionCall> {
        self.calls.get(self.responses.len())
    }

    /// Results in call order, checked one-to-one against the calls
    fn into_responses(self) -> Result<Vec<FunctionResponse>, AgentError> {
        if self.responses.len() != self.calls.len() {
            return Err(AgentError::MalformedResponse(format!(
                "{} result(s) for {} tool call(s)",
                self.responses.len(),
                self.calls.len()
            )));
        }

        for (call, response) in self.calls.iter().zip(&self.responses) {
            if call.call_id != response.call_id || call.name != response.name {
                return Err(AgentError::MalformedResponse(format!(
                    "result for '{}' ({}) does not match call '{}' ({})",
                    response.name, response.call_id, call.name, call.call_id
                )));
            }
        }

        Ok(self.responses)
    }
}

pub struct Agent {
    config: AgentConfig,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    descriptors: Vec<ToolDescriptor>,
    model: Box<dyn ModelClient>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        registry: Arc<ToolRegistry>,
        model: Box<dyn ModelClient>,
    ) -> Self {
        log_info(&format!(
            "Creating agent for {} with {} tool(s), model {}",
            config.working_root.display(),
            registry.len(),
            model.model_name()
        ));

        Self {
            descriptors: registry.descriptors(),
            executor: ToolExecutor::new(Arc::clone(&registry)),
            registry,
            config,
            model,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn generate(&mut self, prompt: &str) -> Result<AgentOutcome, AgentError> {
        self.generate_with_messages(vec![Message::user(prompt)]).await
    }

    /// Start from an existing message history instead of a single prompt
    pub async fn generate_with_messages(
        &mut self,
        messages: Vec<Message>,
    ) -> Result<AgentOutcome, AgentError> {
        let session = Session {
            conversation: Conversation::from_messages(messages),
            iterations: 0,
            batch: None,
        };
        self.drive(session).await
    }

    /// Continue a suspended call with the approval decision for its pending tool call
    pub async fn resume(
        &mut self,
        pending: PendingConfirmation,
        decision: Decision,
    ) -> Result<AgentOutcome, AgentError> {
        let PendingConfirmation { request, mut session } = pending;

        let call = session
            .batch
            .as_ref()
            .and_then(ToolBatch::next_call)
            .filter(|call| call.call_id == request.call_id)
            .cloned()
            .ok_or_else(|| {
                AgentError::MalformedResponse(format!(
                    "no pending tool call with id '{}'",
                    request.call_id
                ))
            })?;

        let response = match decision {
            Decision::Allow => {
                log_info(&format!("Execution of {} approved", call.name));
                self.dispatch(&call).await
            }
            Decision::Deny => {
                log_info(&format!("Execution of {} refused", call.name));
                FunctionResponse::error(&call, format!("Refused to run {}", call.name))
            }
        };

        if let Some(batch) = session.batch.as_mut() {
            batch.responses.push(response);
        }
        self.drive(session).await
    }

    /// Drive `generate`/`resume` to completion, asking `confirmer` at every gate
    pub async fn run(
        &mut self,
        prompt: &str,
        confirmer: &mut dyn Confirmer,
    ) -> Result<AgentResponse, AgentError> {
        let mut outcome = self.generate(prompt).await?;
        loop {
            match outcome {
                AgentOutcome::Completed(response) => return Ok(response),
                AgentOutcome::NeedsConfirmation(pending) => {
                    let decision = confirmer.confirm(pending.request());
                    outcome = self.resume(pending, decision).await?;
                }
            }
        }
    }

    fn requires_confirmation(&self, tool_name: &str) -> bool {
        !self.config.allow_exec
            && self.config.confirm_tools.contains(tool_name)
            && self.registry.contains(tool_name)
    }

    async fn dispatch(&self, call: &FunctionCall) -> FunctionResponse {
        if self.config.verbose {
            log_info(&format!(
                "Calling function: {}({})",
                call.name,
                serde_json::Value::Object(call.arguments.clone())
            ));
        } else {
            log_info(&format!(" - Calling function: {}", call.name));
        }

        let response = self
            .executor
            .execute_tool_call(&self.config.working_root, call)
            .await;

        if self.config.verbose {
            log_info(&format!("-> {}", response.text().unwrap_or_default()));
        }
        response
    }

    async fn drive(&mut self, mut session: Session) -> Result<AgentOutcome, AgentError> {
        loop {
            // Dispatch the rest of the current batch, in order
            while let Some(call) = session
                .batch
                .as_ref()
                .and_then(ToolBatch::next_call)
                .cloned()
            {
                if self.requires_confirmation(&call.name) {
                    let request = ConfirmationRequest::from_call(&call);
                    log_info(&format!("Awaiting confirmation: {}", request.prompt()));
                    return Ok(AgentOutcome::NeedsConfirmation(PendingConfirmation {
                        request,
                        session,
                    }));
                }

                let response = self.dispatch(&call).await;
                if let Some(batch) = session.batch.as_mut() {
                    batch.responses.push(response);
                }
            }

            if let Some(batch) = session.batch.take() {
                let responses = batch.into_responses()?;
                session.conversation.push(Message::tool_responses(responses));
                session.iterations += 1;
            }

            if session.iterations >= self.config.max_iterations {
                log_error(&format!("Giving up after {} tool round(s)", session.iterations));
                return Err(AgentError::IterationsExhausted {
                    max_iterations: self.config.max_iterations,
                });
            }

            log_debug(&format!(
                "Requesting model turn {} with {} message(s)",
                session.iterations + 1,
                session.conversation.len()
            ));

            let request = ModelRequest {
                conversation: &session.conversation,
                tools: &self.descriptors,
                system_instruction: &self.config.system_instruction,
            };
            let response = self
                .model
                .generate(request)
                .await
                .map_err(AgentError::Model)?;

            match response {
                ModelResponse::Final { text, usage } => {
                    session.conversation.push(Message::assistant(text.clone()));
                    log_info(&format!(
                        "Completed after {} tool round(s), tokens: {}",
                        session.iterations,
                        usage.format_short()
                    ));
                    return Ok(AgentOutcome::Completed(AgentResponse {
                        text,
                        usage,
                        conversation: session.conversation,
                        iterations: session.iterations,
                    }));
                }
                ModelResponse::ToolCalls { text, calls, .. } => {
                    let batch = ToolBatch::new(calls.clone())?;
                    session
                        .conversation
                        .push(Message::assistant_tool_calls(text, calls));
                    session.batch = Some(batch);
                }
            }
        }
    }
}
