use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

use crate::conversation::{Conversation, FunctionCall, TokenUsage};
use crate::tools::ToolDescriptor;

/// Everything the model sees for one turn
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub conversation: &'a Conversation,
    pub tools: &'a [ToolDescriptor],
    pub system_instruction: &'a str,
}

/// One model turn: either a final answer or a batch of tool calls
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Final {
        text: String,
        usage: TokenUsage,
    },
    ToolCalls {
        text: Option<String>,
        calls: Vec<FunctionCall>,
        usage: TokenUsage,
    },
}

/// The language model collaborator driving the agent loop
#[async_trait]
pub trait ModelClient: Debug + Send + Sync {
    async fn generate(&mut self, request: ModelRequest<'_>) -> Result<ModelResponse>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Get provider-specific information (e.g., "Gemini")
    fn provider_name(&self) -> &str;
}

/// Configuration for creating model clients
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: String,
    pub api_key: String,
}

/// Factory for creating model clients
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a client based on the model string
    /// Model format: "`provider::model`" or just "model" (defaults to Gemini)
    pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn ModelClient>> {
        let (provider_name, model_name) = match config.model.split_once("::") {
            Some((provider, model)) => (provider, model),
            None => ("gemini", config.model.as_str()),
        };

        match provider_name.to_lowercase().as_str() {
            "gemini" => {
                let client =
                    crate::gemini::GeminiClient::new(model_name.to_string(), config.api_key)?;
                Ok(Box::new(client))
            }
            _ => Err(anyhow::anyhow!(
                "Unsupported provider: {provider_name}. Supported providers: gemini"
            )),
        }
    }
}
