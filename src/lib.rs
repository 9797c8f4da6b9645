//! A file-manipulating coding agent confined to one working directory.
//!
//! The [`agent::Agent`] loop asks a [`provider::ModelClient`] for its next
//! turn, dispatches the proposed tool calls through a shared
//! [`tools::ToolRegistry`] and feeds the results back until the model
//! produces a final answer.

pub mod agent;
pub mod confirmation;
pub mod constants;
pub mod conversation;
pub mod gemini;
pub mod logging;
pub mod provider;
pub mod tools;

pub use agent::{Agent, AgentConfig, AgentError, AgentOutcome, AgentResponse, PendingConfirmation};
pub use confirmation::{ConfirmationRequest, Confirmer, Decision, FixedConfirmer};
pub use conversation::{Conversation, FunctionCall, FunctionResponse, Message, Role, TokenUsage};
pub use provider::{ModelClient, ModelRequest, ModelResponse};
