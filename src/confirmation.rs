use serde_json::{Map, Value};

use crate::conversation::FunctionCall;

/// Outcome of a human-approval checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// "y" or "yes" in any case allows, everything else denies
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}

/// A tool call waiting for approval before it runs
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRequest {
    pub call_id: String,
    pub tool_name: String,
    pub path: String,
    /// Call arguments minus the path
    pub arguments: Map<String, Value>,
}

impl ConfirmationRequest {
    pub fn from_call(call: &FunctionCall) -> Self {
        let path = call
            .string_argument("file_path")
            .unwrap_or("unknown")
            .to_string();
        let arguments = call
            .arguments
            .iter()
            .filter(|(key, _)| key.as_str() != "file_path")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            path,
            arguments,
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "Allow execution of '{}' with args {}? (y/N)",
            self.path,
            Value::Object(self.arguments.clone())
        )
    }
}

/// Source of approval decisions for [`crate::agent::Agent::run`]
pub trait Confirmer: Send {
    fn confirm(&mut self, request: &ConfirmationRequest) -> Decision;
}

/// Answers every request the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmer(pub Decision);

impl Confirmer for FixedConfirmer {
    fn confirm(&mut self, _request: &ConfirmationRequest) -> Decision {
        self.0
    }
}
