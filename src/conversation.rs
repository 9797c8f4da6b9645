use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn format_short(&self) -> String {
        match (
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
        ) {
            (Some(p), Some(c), Some(t)) => format!("{}+{}={}", p, c, t),
            (Some(p), Some(c), None) => format!("{}+{}", p, c),
            (None, None, Some(t)) => format!("{}", t),
            _ => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A model-proposed invocation of a named operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn string_argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Result of one function call, paired to it by `call_id`
///
/// Successful calls carry `{"result": ...}`, recoverable failures `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub call_id: String,
    pub name: String,
    pub response: Map<String, Value>,
}

impl FunctionResponse {
    pub fn result(call: &FunctionCall, output: impl Into<String>) -> Self {
        Self::with_field(call, "result", output.into())
    }

    pub fn error(call: &FunctionCall, message: impl Into<String>) -> Self {
        Self::with_field(call, "error", message.into())
    }

    fn with_field(call: &FunctionCall, key: &str, text: String) -> Self {
        let mut response = Map::new();
        response.insert(key.to_string(), Value::String(text));
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.contains_key("error")
    }

    /// The result or error text
    pub fn text(&self) -> Option<&str> {
        self.response
            .get("result")
            .or_else(|| self.response.get("error"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Assistant turn proposing tool calls, optionally preceded by text
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<FunctionCall>) -> Self {
        let mut parts: Vec<Part> = text
            .filter(|t| !t.trim().is_empty())
            .map(Part::Text)
            .into_iter()
            .collect();
        parts.extend(calls.into_iter().map(Part::FunctionCall));
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    pub fn tool_responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::Tool,
            parts: responses.into_iter().map(Part::FunctionResponse).collect(),
        }
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn function_responses(&self) -> impl Iterator<Item = &FunctionResponse> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionResponse(response) => Some(response),
            _ => None,
        })
    }
}

/// Ordered, append-only message history of one agent session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_call_non_object_arguments_become_empty() {
        let call = FunctionCall::new("c1", "get_files_info", Value::Null);
        assert!(call.arguments.is_empty());

        let call = FunctionCall::new("c2", "get_file_content", json!({"file_path": "a.txt"}));
        assert_eq!(call.string_argument("file_path"), Some("a.txt"));
        assert_eq!(call.string_argument("missing"), None);
    }

    #[test]
    fn test_function_response_result_and_error() {
        let call = FunctionCall::new("c1", "write_file", json!({}));

        let ok = FunctionResponse::result(&call, "done");
        assert!(!ok.is_error());
        assert_eq!(ok.text(), Some("done"));
        assert_eq!(ok.call_id, "c1");
        assert_eq!(ok.name, "write_file");

        let err = FunctionResponse::error(&call, "boom");
        assert!(err.is_error());
        assert_eq!(err.text(), Some("boom"));
        assert_eq!(serde_json::to_value(&err.response).unwrap(), json!({"error": "boom"}));
    }

    #[test]
    fn test_assistant_tool_calls_skips_blank_text() {
        let calls = vec![FunctionCall::new("c1", "get_files_info", json!({}))];

        let message = Message::assistant_tool_calls(Some("  ".to_string()), calls.clone());
        assert_eq!(message.parts.len(), 1);

        let message = Message::assistant_tool_calls(Some("Listing".to_string()), calls);
        assert_eq!(message.parts.len(), 2);
        assert_eq!(message.text(), "Listing");
        assert_eq!(message.function_calls().count(), 1);
    }

    #[test]
    fn test_part_serialization_is_tagged() {
        let value = serde_json::to_value(Part::Text("hi".to_string())).unwrap();
        assert_eq!(value, json!({"type": "Text", "data": "hi"}));

        let message = Message::user("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
    }

    #[test]
    fn test_token_usage_format_short() {
        let usage = TokenUsage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        };
        assert_eq!(usage.format_short(), "10+5=15");
        assert_eq!(TokenUsage::default().format_short(), "N/A");
    }
}
