use crate::conversation::{Conversation, FunctionCall, FunctionResponse, Part, Role, TokenUsage};
use crate::logging::{log_debug, log_info, log_trace};
use crate::provider::{ModelClient, ModelRequest, ModelResponse};
use crate::tools::ToolDescriptor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest, ChatResponse, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use serde_json::{Value, json};
use std::collections::HashSet;

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("No API key provided"));
        }

        log_info(&format!(
            "Initializing Gemini API client with model: {}",
            model
        ));

        Ok(Self { api_key, model })
    }

    fn client(&self) -> Client {
        let api_key = self.api_key.clone();
        let auth_resolver = AuthResolver::from_resolver_fn(move |_model_iden| {
            Ok(Some(AuthData::from_single(api_key.clone())))
        });

        Client::builder().with_auth_resolver(auth_resolver).build()
    }

    /// Log chat request structure
    fn log_chat_request_structure(messages: &[ChatMessage]) {
        log_debug("=== Chat Request Structure ===");
        log_debug(&format!("Total Messages: {}", messages.len()));

        for (i, msg) in messages.iter().enumerate() {
            log_debug(&format!("Message {}: {:?}", i + 1, msg.role));
            log_trace(&format!("  Content: {:?}", msg.content));
        }
        log_debug("=== End Chat Request Structure ===");
    }
}

/// Convert the conversation into genai chat messages
///
/// Assistant text and tool calls become separate messages; each tool
/// response becomes its own tool message keyed by call id.
pub fn to_chat_messages(conversation: &Conversation) -> Result<Vec<ChatMessage>> {
    let mut messages = Vec::new();

    for message in conversation.messages() {
        match message.role {
            Role::User => {
                let text = message.text();
                if !text.is_empty() {
                    messages.push(ChatMessage::user(text));
                }
            }
            Role::Assistant => {
                let text = message.text();
                if !text.is_empty() {
                    messages.push(ChatMessage::assistant(text));
                }

                let calls = message
                    .function_calls()
                    .map(to_genai_tool_call)
                    .collect::<Result<Vec<_>>>()?;
                if !calls.is_empty() {
                    messages.push(ChatMessage::from(calls));
                }
            }
            Role::Tool => {
                for part in &message.parts {
                    if let Part::FunctionResponse(response) = part {
                        messages.push(ChatMessage::from(to_genai_tool_response(response)?));
                    }
                }
            }
        }
    }

    Ok(messages)
}

// Built through serde so optional provider-specific fields take their defaults
fn to_genai_tool_call(call: &FunctionCall) -> Result<ToolCall> {
    serde_json::from_value(json!({
        "call_id": call.call_id,
        "fn_name": call.name,
        "fn_arguments": Value::Object(call.arguments.clone()),
    }))
    .with_context(|| format!("Failed to encode tool call {}", call.name))
}

/// Gemini pairs a function response with its call by function name, and
/// genai sends `ToolResponse::call_id` as that name
fn to_genai_tool_response(response: &FunctionResponse) -> Result<ToolResponse> {
    let content = serde_json::to_string(&response.response)?;
    Ok(ToolResponse::new(response.name.clone(), content))
}

/// Convert provider tool calls, making every call id unique within the turn
///
/// Gemini has no call ids; genai fills them with the function name, so two
/// calls to the same tool arrive with the same id.
pub fn from_genai_tool_calls(tool_calls: Vec<ToolCall>) -> Vec<FunctionCall> {
    let mut seen = HashSet::new();
    tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, tool_call)| {
            let proposed = if tool_call.call_id.is_empty() {
                format!("call_{i}")
            } else {
                tool_call.call_id
            };
            let call_id = unique_call_id(&mut seen, proposed, i);
            FunctionCall::new(call_id, tool_call.fn_name, tool_call.fn_arguments)
        })
        .collect()
}

fn unique_call_id(seen: &mut HashSet<String>, proposed: String, index: usize) -> String {
    if seen.insert(proposed.clone()) {
        return proposed;
    }
    let mut candidate = format!("{proposed}_{index}");
    while !seen.insert(candidate.clone()) {
        candidate.push('_');
    }
    candidate
}

pub fn to_genai_tools(descriptors: &[ToolDescriptor]) -> Result<Vec<Tool>> {
    descriptors.iter().map(ToolDescriptor::to_genai_tool).collect()
}

fn from_genai_response(chat_response: ChatResponse) -> ModelResponse {
    let usage = TokenUsage {
        prompt_tokens: chat_response.usage.prompt_tokens.map(|t| t as u32),
        completion_tokens: chat_response.usage.completion_tokens.map(|t| t as u32),
        total_tokens: chat_response.usage.total_tokens.map(|t| t as u32),
    };
    let text = chat_response.first_text().map(str::to_string);

    let calls = from_genai_tool_calls(chat_response.into_tool_calls());

    if calls.is_empty() {
        ModelResponse::Final {
            text: text.unwrap_or_default(),
            usage,
        }
    } else {
        ModelResponse::ToolCalls { text, calls, usage }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&mut self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let messages = to_chat_messages(request.conversation)?;
        Self::log_chat_request_structure(&messages);

        let mut chat_request = ChatRequest::new(messages);
        if !request.system_instruction.is_empty() {
            chat_request = chat_request.with_system(request.system_instruction);
        }
        if !request.tools.is_empty() {
            chat_request = chat_request.with_tools(to_genai_tools(request.tools)?);
        }

        log_trace(&format!("Request Debug: {:?}", chat_request));

        let chat_response = self
            .client()
            .exec_chat(&self.model, chat_request, None)
            .await
            .context("Failed to send chat request to Gemini API")?;

        log_trace(&format!("Response Debug: {:?}", chat_response));

        let response = from_genai_response(chat_response);
        match &response {
            ModelResponse::Final { text, .. } => log_info(&format!(
                "Received final response from Gemini API, length: {}",
                text.len()
            )),
            ModelResponse::ToolCalls { calls, .. } => log_info(&format!(
                "Received {} tool call(s) from Gemini API",
                calls.len()
            )),
        }

        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Gemini"
    }
}
